//! Campay webhook authentication.
//!
//! Callbacks are signed with HMAC-SHA256 over the raw body. Anything that
//! fails the check is refused before the payload is parsed.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Method, StatusCode};

use vide_grenier_integration_tests::{TestApp, WEBHOOK_SECRET, campay_config, config, request};
use vide_grenier_marketplace::services::payments::{SIGNATURE_HEADER, sign};

const URI: &str = "/api/v1/webhooks/campay";

fn webhook_app() -> TestApp {
    let mut config = config("postgres://127.0.0.1:1/x");
    config.campay = Some(campay_config());
    TestApp::offline_with(config)
}

fn webhook(body: &str, signature: Option<&str>) -> axum::http::Request<Body> {
    let mut builder = request(Method::POST, URI).header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_owned())).unwrap()
}

#[tokio::test]
async fn test_webhook_refused_when_not_configured() {
    let app = TestApp::offline();
    let body = r#"{"reference":"PAY_ABC","status":"SUCCESSFUL"}"#;
    let signature = sign(WEBHOOK_SECRET.as_bytes(), body.as_bytes());
    let response = app.send(webhook(body, Some(&signature))).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_webhook_without_signature_is_unauthorized() {
    let app = webhook_app();
    let response = app
        .send(webhook(r#"{"reference":"PAY_ABC","status":"SUCCESSFUL"}"#, None))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error(), "missing webhook signature");
}

#[tokio::test]
async fn test_webhook_with_wrong_secret_is_unauthorized() {
    let app = webhook_app();
    let body = r#"{"reference":"PAY_ABC","status":"SUCCESSFUL"}"#;
    let forged = sign(b"not-the-shared-secret", body.as_bytes());
    let response = app.send(webhook(body, Some(&forged))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error(), "invalid webhook signature");
}

#[tokio::test]
async fn test_webhook_signature_covers_the_whole_body() {
    let app = webhook_app();
    let signed = r#"{"reference":"PAY_ABC","status":"FAILED"}"#;
    let tampered = r#"{"reference":"PAY_ABC","status":"SUCCESSFUL"}"#;
    let signature = sign(WEBHOOK_SECRET.as_bytes(), signed.as_bytes());
    let response = app.send(webhook(tampered, Some(&signature))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_garbage_is_a_bad_request() {
    let app = webhook_app();
    let body = "reference=PAY_ABC";
    let signature = sign(WEBHOOK_SECRET.as_bytes(), body.as_bytes());
    let response = app.send(webhook(body, Some(&signature))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
