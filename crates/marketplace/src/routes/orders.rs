//! Order, payment and review route handlers, plus the Campay webhook.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vide_grenier_core::{OrderId, OrderStatus, PaymentMethod, Phone, ReviewScores, UserId};

use super::Ack;
use crate::db::payments::PaymentRepository;
use crate::error::{ApiJson, AppError, Result};
use crate::middleware::{AuthUser, RequireAuth};
use crate::models::{Order, Payment, Review};
use crate::services::orders::PlaceOrder;
use crate::services::payments::{SIGNATURE_HEADER, WebhookPayload, verify_signature};
use crate::services::{AuthService, OrderService, PaymentService};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub bought: Vec<Order>,
    pub sold: Vec<Order>,
}

/// An order with its payment attempts. The pickup code is only shown to
/// the buyer.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_code: Option<String>,
    pub payments: Vec<Payment>,
}

impl OrderDetail {
    #[must_use]
    pub fn for_viewer(order: Order, viewer: UserId, payments: Vec<Payment>) -> Self {
        let pickup_code = (order.buyer_id == Some(viewer)).then(|| order.pickup_code.clone());
        Self {
            order,
            pickup_code,
            payments,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub ratings: ReviewScores,
    #[serde(default)]
    pub comment: String,
}

/// Payment initiation. The method defaults to the one chosen at checkout.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub phone: String,
    pub method: Option<PaymentMethod>,
}

fn orders(state: &AppState) -> OrderService<'_> {
    OrderService::new(state.pool(), state.notifier())
}

/// Place an order; the product is reserved in the same transaction.
#[instrument(skip(user, state, body), fields(buyer_id = %user.id))]
pub async fn place_order(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PlaceOrder>,
) -> Result<(StatusCode, Json<OrderDetail>)> {
    let buyer = AuthService::new(state.pool()).active_user(user.id).await?;
    let order = orders(&state).place(&buyer, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(OrderDetail::for_viewer(order, user.id, Vec::new())),
    ))
}

pub async fn list_orders(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<OrderList>> {
    let (bought, sold) = orders(&state).list_for(user.id).await?;
    Ok(Json(OrderList { bought, sold }))
}

#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn get_order(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let order = orders(&state).get_for(id, user.id, user.user_type).await?;
    let payments = PaymentRepository::new(state.pool())
        .list_for_order(order.id)
        .await?;
    Ok(Json(OrderDetail::for_viewer(order, user.id, payments)))
}

/// Move an order along its lifecycle. Who may take which edge is decided by
/// the order service.
#[instrument(skip(user, state), fields(user_id = %user.id, status = %body.status))]
pub async fn update_status(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    ApiJson(body): ApiJson<StatusRequest>,
) -> Result<Json<Order>> {
    Ok(Json(
        orders(&state)
            .update_status(id, user.id, user.user_type, body.status)
            .await?,
    ))
}

#[instrument(skip(user, state, body), fields(user_id = %user.id))]
pub async fn review_order(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    ApiJson(body): ApiJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = orders(&state)
        .review(id, user.id, &body.ratings, &body.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// Start paying a pending order. Only its buyer may pay it.
#[instrument(skip(user, state, body), fields(user_id = %user.id))]
pub async fn initiate_payment(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    ApiJson(body): ApiJson<PaymentRequest>,
) -> Result<(StatusCode, Json<Payment>)> {
    let phone = Phone::parse(&body.phone).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let order = orders(&state).get_for(id, user.id, user.user_type).await?;
    if order.buyer_id != Some(user.id) {
        return Err(AppError::Forbidden(
            "only the buyer can pay this order".to_owned(),
        ));
    }

    let method = body.method.unwrap_or(order.payment_method);
    let payment = PaymentService::new(state.pool(), state.campay())
        .initiate(&order, &phone, method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn get_payment(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Payment>> {
    let payment = PaymentService::new(state.pool(), state.campay())
        .get(&reference)
        .await?;
    authorize_payment(&state, &user, &payment).await?;
    Ok(Json(payment))
}

/// Ask the provider for the outcome of a pending payment.
#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn verify_payment(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Payment>> {
    let payments = PaymentService::new(state.pool(), state.campay());
    let payment = payments.get(&reference).await?;
    authorize_payment(&state, &user, &payment).await?;
    Ok(Json(payments.verify(&reference).await?))
}

/// Campay collection callback, authenticated by an HMAC of the raw body.
#[instrument(skip_all)]
pub async fn campay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>> {
    let secret = state
        .config()
        .campay
        .as_ref()
        .and_then(|c| c.webhook_secret.as_ref())
        .ok_or_else(|| {
            AppError::ServiceUnavailable("payment webhooks are not configured".to_owned())
        })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing webhook signature".to_owned()))?;
    if !verify_signature(secret.expose_secret().as_bytes(), &body, signature) {
        tracing::warn!("Rejected Campay webhook with a bad signature");
        return Err(AppError::Unauthorized("invalid webhook signature".to_owned()));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid webhook payload: {e}")))?;
    let payment = PaymentService::new(state.pool(), state.campay())
        .apply_webhook(&payload)
        .await?;
    tracing::info!(reference = %payment.reference, status = %payment.status, "Campay webhook applied");
    Ok(Json(Ack::new("Webhook processed")))
}

/// Payments are visible to the order's participants and admins.
async fn authorize_payment(state: &AppState, user: &AuthUser, payment: &Payment) -> Result<()> {
    orders(state)
        .get_for(payment.order_id, user.id, user.user_type)
        .await
        .map(|_| ())
        .map_err(|_| AppError::NotFound("Payment".to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_review_request_requires_all_ratings() {
        let parsed = serde_json::from_value::<ReviewRequest>(serde_json::json!({
            "ratings": { "overall": 5, "communication": 4 },
        }));
        assert!(parsed.is_err());

        let parsed: ReviewRequest = serde_json::from_value(serde_json::json!({
            "ratings": {
                "overall": 5,
                "communication": 4,
                "delivery": 4,
                "product_quality": 5,
                "value_for_money": 3,
            },
        }))
        .unwrap();
        assert!(parsed.comment.is_empty());
    }

    #[test]
    fn test_payment_request_method_is_optional() {
        let parsed: PaymentRequest =
            serde_json::from_value(serde_json::json!({ "phone": "677123456" })).unwrap();
        assert!(parsed.method.is_none());
    }
}
