//! Request handling that is decided before any query runs: health checks,
//! middleware headers, authentication, role guards and input validation.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use serde_json::json;

use vide_grenier_core::{UserId, UserType};
use vide_grenier_integration_tests::{
    TestApp, admin_token, client_token, get, json, staff_token, token, token_for,
};
use vide_grenier_marketplace::services::auth::TokenType;

// ============================================================================
// Health & middleware
// ============================================================================

#[tokio::test]
async fn test_health_is_ok_without_database() {
    let app = TestApp::offline();
    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let app = TestApp::offline();
    let response = app.send(get("/health/ready", None)).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_responses_carry_security_headers_and_request_id() {
    let app = TestApp::offline();
    let response = app.send(get("/health", None)).await;
    assert_eq!(response.headers["x-frame-options"], "DENY");
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_client_request_id_is_echoed() {
    let app = TestApp::offline();
    let request = vide_grenier_integration_tests::request(Method::GET, "/health")
        .header("x-request-id", "mobile-7f3a")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.headers["x-request-id"], "mobile-7f3a");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::offline();
    let response = app.send(get("/api/v1/does-not-exist", None)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let app = TestApp::offline();
    for uri in [
        "/api/v1/users/me",
        "/api/v1/orders",
        "/api/v1/chats",
        "/api/v1/notifications",
        "/api/v1/wallet",
        "/api/v1/favorites",
        "/api/v1/wishlists",
        "/api/v1/support",
        "/api/v1/products/mine",
    ] {
        let response = app.send(get(uri, None)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(response.error(), "authentication required", "{uri}");
    }
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let app = TestApp::offline();
    let response = app.send(get("/api/v1/wallet", Some("not.a.jwt"))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_cannot_call_the_api() {
    let app = TestApp::offline();
    let refresh = token(UserType::Client, TokenType::Refresh);
    let response = app.send(get("/api/v1/notifications", Some(&refresh))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = TestApp::offline();
    let expired = token_for(UserId::generate(), UserType::Client, TokenType::Access, -3600);
    let response = app.send(get("/api/v1/orders", Some(&expired))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_another_secret_is_rejected() {
    let mut config = vide_grenier_integration_tests::config("postgres://127.0.0.1:1/x");
    config.jwt_secret = secrecy::SecretString::from("Zx8!aQ4#mW2$kE7^rT5&yU1*iO9Pl3Gh".to_owned());
    let app = TestApp::offline_with(config);
    let response = app.send(get("/api/v1/wallet", Some(&client_token()))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Role guards
// ============================================================================

#[tokio::test]
async fn test_admin_routes_forbid_clients_and_staff() {
    let app = TestApp::offline();
    for token in [client_token(), staff_token()] {
        for uri in [
            "/api/v1/admin/dashboard",
            "/api/v1/admin/users",
            "/api/v1/admin/stock/report",
            "/api/v1/admin/commissions",
            "/api/v1/admin/newsletter/campaigns",
            "/api/v1/admin/support",
            "/api/v1/admin/support/stats",
        ] {
            let response = app.send(get(uri, Some(&token))).await;
            assert_eq!(response.status, StatusCode::FORBIDDEN, "{uri}");
            assert_eq!(response.error(), "admin access required");
        }
    }
}

#[tokio::test]
async fn test_staff_routes_forbid_clients() {
    let app = TestApp::offline();
    let response = app
        .send(get("/api/v1/staff/tasks", Some(&client_token())))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error(), "staff access required");
}

#[tokio::test]
async fn test_staff_cannot_create_tasks() {
    let app = TestApp::offline();
    let body = json!({ "title": "Inventaire", "task_type": "INVENTORY" });
    let response = app
        .send(json(Method::POST, "/api/v1/staff/tasks", Some(&staff_token()), &body))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_is_checked_before_the_body() {
    let app = TestApp::offline();
    let response = app
        .send(json(
            Method::POST,
            "/api/v1/admin/categories",
            Some(&client_token()),
            &json!({ "unexpected": true }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_register_rejects_unknown_city() {
    let app = TestApp::offline();
    let body = json!({
        "email": "awa@example.cm",
        "phone": "677123456",
        "password": "Ndole-2026!",
        "first_name": "Awa",
        "last_name": "Ngono",
        "city": "Paris",
    });
    let response = app
        .send(json(Method::POST, "/api/v1/auth/register", None, &body))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_rejects_foreign_phone_number() {
    let app = TestApp::offline();
    let body = json!({
        "email": "awa@example.cm",
        "phone": "+33612345678",
        "password": "Ndole-2026!",
        "first_name": "Awa",
        "last_name": "Ngono",
        "city": "DOUALA",
    });
    let response = app
        .send(json(Method::POST, "/api/v1/auth/register", None, &body))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let app = TestApp::offline();
    let body = json!({
        "email": "awa@example.cm",
        "phone": "677123456",
        "password": "abc",
        "first_name": "Awa",
        "last_name": "Ngono",
        "city": "YAOUNDE",
    });
    let response = app
        .send(json(Method::POST, "/api/v1/auth/register", None, &body))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forgot_password_does_not_reveal_accounts() {
    let app = TestApp::offline();
    let body = json!({ "identifier": "pas-un-compte" });
    let response = app
        .send(json(Method::POST, "/api/v1/auth/password/forgot", None, &body))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
}

#[tokio::test]
async fn test_password_reset_rejects_weak_password_before_lookup() {
    let app = TestApp::offline();
    let body = json!({ "identifier": "awa@example.cm", "code": "123456", "new_password": "abc" });
    let response = app
        .send(json(Method::POST, "/api/v1/auth/password/reset", None, &body))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_password_change_requires_a_token() {
    let app = TestApp::offline();
    let body = json!({ "current_password": "ancien-mot-de-passe", "new_password": "nouveau-mdp" });
    let response = app
        .send(json(Method::POST, "/api/v1/users/me/password", None, &body))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let app = TestApp::offline();
    let request = vide_grenier_integration_tests::request(Method::POST, "/api/v1/orders")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", client_token()))
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(!response.error().is_empty());
}

#[tokio::test]
async fn test_payment_phone_is_validated_before_lookup() {
    let app = TestApp::offline();
    let uri = format!("/api/v1/orders/{}/payments", UserId::generate());
    let body = json!({ "phone": "12345" });
    let response = app
        .send(json(Method::POST, &uri, Some(&client_token()), &body))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_wishlist_name_is_validated_before_lookup() {
    let app = TestApp::offline();
    let response = app
        .send(json(
            Method::POST,
            "/api/v1/wishlists",
            Some(&client_token()),
            &json!({ "name": "   " }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error(), "wishlist name is required");
}

#[tokio::test]
async fn test_support_ticket_needs_subject_and_message() {
    let app = TestApp::offline();
    for (body, error) in [
        (json!({ "subject": " ", "message": "Mon colis" }), "subject is required"),
        (json!({ "subject": "Livraison", "message": "" }), "message is required"),
    ] {
        let response = app
            .send(json(Method::POST, "/api/v1/support", Some(&client_token()), &body))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error(), error);
    }
}

#[tokio::test]
async fn test_support_reply_is_validated_before_lookup() {
    let app = TestApp::offline();
    let uri = format!("/api/v1/admin/support/{}/messages", uuid::Uuid::new_v4());
    let response = app
        .send(json(Method::POST, &uri, Some(&admin_token()), &json!({ "content": "  " })))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error(), "message is required");
}

#[tokio::test]
async fn test_malformed_ids_are_rejected() {
    let app = TestApp::offline();
    let response = app
        .send(get("/api/v1/orders/not-a-uuid", Some(&client_token())))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_stock_validation() {
    let app = TestApp::offline();
    let body = json!({
        "product_id": UserId::generate(),
        "sku": "  ",
        "purchase_price": 45_000,
        "quantity": 3,
    });
    let response = app
        .send(json(Method::POST, "/api/v1/admin/stock", Some(&admin_token()), &body))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error(), "sku is required");
}

#[tokio::test]
async fn test_admin_cannot_deactivate_themself() {
    let app = TestApp::offline();
    let admin = UserId::generate();
    let token = token_for(admin, UserType::Admin, TokenType::Access, 3600);
    let uri = format!("/api/v1/admin/users/{admin}/active");
    let response = app
        .send(json(Method::POST, &uri, Some(&token), &json!({ "active": false })))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_auth_routes_are_rate_limited() {
    let app = TestApp::offline();
    let body = json!({ "identifier": "awa@example.cm" });
    let mut statuses = Vec::new();
    for _ in 0..8 {
        let response = app
            .send(json(Method::POST, "/api/v1/auth/login", None, &body))
            .await;
        statuses.push(response.status);
    }
    // Missing password fails validation until the burst of 5 is spent.
    assert!(statuses[..5].iter().all(|s| *s == StatusCode::BAD_REQUEST), "{statuses:?}");
    assert_eq!(statuses[7], StatusCode::TOO_MANY_REQUESTS);
}
