//! Public newsletter subscription handlers.
//!
//! Both operations are idempotent: subscribing twice reactivates the
//! address, unsubscribing an unknown address succeeds.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use super::Ack;
use crate::error::{ApiJson, Result};
use crate::services::NewsletterService;
use crate::state::AppState;

/// Newsletter subscription form data.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub email: String,
}

#[instrument(skip(state), fields(email = %body.email))]
pub async fn subscribe(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SubscribeRequest>,
) -> Result<(StatusCode, Json<Ack>)> {
    NewsletterService::new(state.pool(), state.email())
        .subscribe(&body.email, body.name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(Ack::new("Subscribed to the newsletter"))))
}

/// Unsubscribe link target; answers GET (from emails) and POST.
#[instrument(skip(state), fields(email = %query.email))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Query(query): Query<UnsubscribeQuery>,
) -> Result<Json<Ack>> {
    NewsletterService::new(state.pool(), state.email())
        .unsubscribe(&query.email)
        .await?;
    Ok(Json(Ack::new("Unsubscribed from the newsletter")))
}
