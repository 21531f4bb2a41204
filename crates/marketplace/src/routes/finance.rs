//! Wallet, escrow and installment route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vide_grenier_core::{EscrowId, InstallmentPlanId, OrderId, Xaf};

use super::PageQuery;
use crate::error::{ApiJson, Result};
use crate::middleware::RequireAuth;
use crate::models::{Escrow, InstallmentPlan, WalletAccount, WalletTransaction};
use crate::services::FinanceService;
use crate::services::finance::{InstallmentReceipt, PlanDetail};
use crate::services::payments::generate_reference;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    /// Whole francs.
    pub amount: i64,
    /// Mobile money reference of the incoming transfer, if the client has one.
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    pub wallet: WalletAccount,
    pub transaction: WalletTransaction,
}

#[derive(Debug, Deserialize)]
pub struct OrderRef {
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub order_id: OrderId,
    pub installments: u32,
    pub down_payment_percent: Option<u32>,
}

fn finance(state: &AppState) -> FinanceService<'_> {
    FinanceService::new(state.pool(), state.notifier())
}

pub async fn wallet(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<WalletAccount>> {
    Ok(Json(finance(&state).wallet(user.id).await?))
}

pub async fn transactions(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<WalletTransaction>>> {
    Ok(Json(
        finance(&state)
            .transactions(user.id, page.into())
            .await?,
    ))
}

/// Credit the wallet. Recorded as a completed top-up.
#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn top_up(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<TopUpRequest>,
) -> Result<(StatusCode, Json<TopUpResponse>)> {
    let reference = body
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map_or_else(generate_reference, str::to_owned);
    let (wallet, transaction) = finance(&state)
        .top_up(user.id, Xaf::from_francs(body.amount), &reference)
        .await?;
    Ok((StatusCode::CREATED, Json(TopUpResponse { wallet, transaction })))
}

#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn create_escrow(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OrderRef>,
) -> Result<(StatusCode, Json<Escrow>)> {
    let escrow = finance(&state).create_escrow(body.order_id, user.id).await?;
    Ok((StatusCode::CREATED, Json(escrow)))
}

pub async fn get_escrow(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<EscrowId>,
) -> Result<Json<Escrow>> {
    Ok(Json(finance(&state).escrow(id, user.id).await?))
}

/// Debit amount and fee from the buyer's wallet into the escrow.
#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn fund_escrow(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<EscrowId>,
) -> Result<Json<Escrow>> {
    Ok(Json(finance(&state).fund_escrow(id, user.id).await?))
}

#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn release_escrow(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<EscrowId>,
) -> Result<Json<Escrow>> {
    Ok(Json(finance(&state).release_escrow(id, user.id).await?))
}

#[instrument(skip(user, state, body), fields(user_id = %user.id))]
pub async fn dispute_escrow(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<EscrowId>,
    ApiJson(body): ApiJson<DisputeRequest>,
) -> Result<Json<Escrow>> {
    Ok(Json(
        finance(&state)
            .dispute_escrow(id, user.id, &body.reason)
            .await?,
    ))
}

/// Split a pending order into installments; the down payment is taken now.
#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn create_plan(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PlanRequest>,
) -> Result<(StatusCode, Json<PlanDetail>)> {
    let plan = finance(&state)
        .create_plan(
            body.order_id,
            user.id,
            body.installments,
            body.down_payment_percent,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn list_plans(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<InstallmentPlan>>> {
    Ok(Json(finance(&state).plans(user.id).await?))
}

pub async fn get_plan(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<InstallmentPlanId>,
) -> Result<Json<PlanDetail>> {
    Ok(Json(finance(&state).plan(id, user.id).await?))
}

#[instrument(skip(user, state), fields(user_id = %user.id))]
pub async fn pay_installment(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<InstallmentPlanId>,
) -> Result<Json<InstallmentReceipt>> {
    Ok(Json(finance(&state).pay_next(id, user.id).await?))
}
