//! Support ticket handlers, for customers and for the back-office.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use vide_grenier_core::{SupportStatus, SupportTicketId, UserId};

use crate::db::Page;
use crate::error::{ApiJson, Result};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{SupportMessage, SupportThread, SupportTicket};
use crate::services::SupportService;
use crate::services::support::{SupportStats, TicketForm};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SupportReply {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub assignee_id: UserId,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub status: Option<SupportStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

fn support(state: &AppState) -> SupportService<'_> {
    SupportService::new(state.pool(), state.notifier())
}

pub async fn my_tickets(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<SupportTicket>>> {
    Ok(Json(support(&state).mine(user.id).await?))
}

#[instrument(skip(user, state, form), fields(user_id = %user.id))]
pub async fn open_ticket(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    ApiJson(form): ApiJson<TicketForm>,
) -> Result<(StatusCode, Json<SupportThread>)> {
    let thread = support(&state).open(user.id, &form).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

pub async fn ticket(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<SupportTicketId>,
) -> Result<Json<SupportThread>> {
    Ok(Json(support(&state).thread(id, user.id, false).await?))
}

pub async fn reply(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<SupportTicketId>,
    ApiJson(body): ApiJson<SupportReply>,
) -> Result<(StatusCode, Json<SupportMessage>)> {
    let message = support(&state)
        .post(id, user.id, false, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn close(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<SupportTicketId>,
) -> Result<Json<SupportTicket>> {
    Ok(Json(support(&state).close(id, user.id, false).await?))
}

/// The back-office queue, most urgent first.
pub async fn queue(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<SupportTicket>>> {
    let page = Page::new(query.page, query.per_page);
    Ok(Json(support(&state).queue(query.status, page).await?))
}

pub async fn stats(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<SupportStats>> {
    Ok(Json(support(&state).stats().await?))
}

pub async fn admin_ticket(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<SupportTicketId>,
) -> Result<Json<SupportThread>> {
    Ok(Json(support(&state).thread(id, admin.id, true).await?))
}

#[instrument(skip(admin, state, body), fields(admin_id = %admin.id))]
pub async fn admin_reply(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<SupportTicketId>,
    ApiJson(body): ApiJson<SupportReply>,
) -> Result<(StatusCode, Json<SupportMessage>)> {
    let message = support(&state)
        .post(id, admin.id, true, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn admin_close(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<SupportTicketId>,
) -> Result<Json<SupportTicket>> {
    Ok(Json(support(&state).close(id, admin.id, true).await?))
}

pub async fn assign(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<SupportTicketId>,
    ApiJson(body): ApiJson<AssignRequest>,
) -> Result<Json<SupportTicket>> {
    Ok(Json(support(&state).assign(id, body.assignee_id).await?))
}
