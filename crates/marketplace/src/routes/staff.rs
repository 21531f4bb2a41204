//! Staff back-office handlers: tasks, stock movements and pickups.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use vide_grenier_core::{PickupPointId, StaffTaskId, TaskStatus};

use crate::error::{ApiJson, Result};
use crate::middleware::{AuthUser, RequireAdmin, RequireStaff};
use crate::models::{InventoryMovement, Order, StaffTask};
use crate::services::StaffService;
use crate::services::staff::{MovementForm, TaskForm};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskNotes {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PickupRequest {
    pub pickup_code: String,
}

fn staff(state: &AppState) -> StaffService<'_> {
    StaffService::new(state.pool(), state.notifier())
}

/// Own tasks for staff, every task for admins.
pub async fn list_tasks(
    RequireStaff(user): RequireStaff,
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Vec<StaffTask>>> {
    Ok(Json(
        staff(&state)
            .tasks(user.id, user.user_type, query.status)
            .await?,
    ))
}

#[instrument(skip(admin, state, form), fields(admin_id = %admin.id))]
pub async fn create_task(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiJson(form): ApiJson<TaskForm>,
) -> Result<(StatusCode, Json<StaffTask>)> {
    let task = staff(&state).create_task(admin.id, &form).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn start_task(
    RequireStaff(user): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<StaffTaskId>,
) -> Result<Json<StaffTask>> {
    advance(&state, &user, id, TaskStatus::InProgress, None).await
}

/// Finish a task, optionally with notes for the back-office.
pub async fn complete_task(
    RequireStaff(user): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<StaffTaskId>,
    ApiJson(body): ApiJson<TaskNotes>,
) -> Result<Json<StaffTask>> {
    advance(&state, &user, id, TaskStatus::Completed, body.notes.as_deref()).await
}

pub async fn cancel_task(
    RequireStaff(user): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<StaffTaskId>,
) -> Result<Json<StaffTask>> {
    advance(&state, &user, id, TaskStatus::Cancelled, None).await
}

#[instrument(skip(state, user, notes), fields(user_id = %user.id, next = %next))]
async fn advance(
    state: &AppState,
    user: &AuthUser,
    id: StaffTaskId,
    next: TaskStatus,
    notes: Option<&str>,
) -> Result<Json<StaffTask>> {
    Ok(Json(
        staff(state)
            .advance_task(id, user.id, user.user_type, next, notes)
            .await?,
    ))
}

/// Record a signed stock change at a pickup point.
#[instrument(skip(user, state, form), fields(user_id = %user.id))]
pub async fn record_movement(
    RequireStaff(user): RequireStaff,
    State(state): State<AppState>,
    ApiJson(form): ApiJson<MovementForm>,
) -> Result<(StatusCode, Json<InventoryMovement>)> {
    let movement = staff(&state).record_movement(user.id, &form).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn movements(
    RequireStaff(_user): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<PickupPointId>,
) -> Result<Json<Vec<InventoryMovement>>> {
    Ok(Json(staff(&state).movements(id).await?))
}

/// Hand a shipped order to the customer presenting its pickup code.
#[instrument(skip(user, state, body), fields(user_id = %user.id))]
pub async fn confirm_pickup(
    RequireStaff(user): RequireStaff,
    State(state): State<AppState>,
    ApiJson(body): ApiJson<PickupRequest>,
) -> Result<Json<Order>> {
    Ok(Json(staff(&state).confirm_pickup(&body.pickup_code).await?))
}
