//! Anonymous visitor cart and guest checkout.
//!
//! Carts are keyed by a `session_key` the client generates and keeps; no
//! account is needed. Checkout creates one pickup order per cart line.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vide_grenier_core::{CartItemId, ProductId};

use crate::error::{ApiJson, Result};
use crate::models::{Cart, Order};
use crate::services::orders::GuestCheckout;
use crate::services::{CatalogService, OrderService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

/// A guest order with the code to show at the pickup point.
#[derive(Debug, Serialize)]
pub struct GuestOrder {
    #[serde(flatten)]
    pub order: Order,
    pub pickup_code: String,
}

impl From<Order> for GuestOrder {
    fn from(order: Order) -> Self {
        Self {
            pickup_code: order.pickup_code.clone(),
            order,
        }
    }
}

fn catalog(state: &AppState) -> CatalogService<'_> {
    CatalogService::new(
        state.pool(),
        state.notifier(),
        state.config().commission_rate,
    )
}

pub async fn view(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Result<Json<Cart>> {
    Ok(Json(catalog(&state).cart(&session_key).await?))
}

/// Add a product; quantities of the same product are merged.
#[instrument(skip(state, session_key))]
pub async fn add_item(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
    ApiJson(body): ApiJson<AddItemRequest>,
) -> Result<Json<Cart>> {
    Ok(Json(
        catalog(&state)
            .add_to_cart(&session_key, body.product_id, body.quantity)
            .await?,
    ))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Path((session_key, item_id)): Path<(String, CartItemId)>,
) -> Result<Json<Cart>> {
    Ok(Json(
        catalog(&state)
            .remove_from_cart(&session_key, item_id)
            .await?,
    ))
}

#[instrument(skip(state, body), fields(pickup_point_id = %body.pickup_point_id))]
pub async fn checkout(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<GuestCheckout>,
) -> Result<(StatusCode, Json<Vec<GuestOrder>>)> {
    let orders = OrderService::new(state.pool(), state.notifier())
        .checkout_guest(&body)
        .await?;
    tracing::info!(orders = orders.len(), "Guest checkout completed");
    Ok((
        StatusCode::CREATED,
        Json(orders.into_iter().map(GuestOrder::from).collect()),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_item_defaults_to_one() {
        let body: AddItemRequest = serde_json::from_value(serde_json::json!({
            "product_id": ProductId::generate(),
        }))
        .unwrap();
        assert_eq!(body.quantity, 1);
    }
}
