//! In-app notification route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use vide_grenier_core::NotificationId;

use crate::db::Page;
use crate::db::notifications::NotificationRepository;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Notification;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

pub async fn list(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>> {
    let page = Page::new(query.page, query.per_page);
    Ok(Json(
        NotificationRepository::new(state.pool())
            .list(user.id, query.unread_only, page)
            .await?,
    ))
}

pub async fn unread_count(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<UnreadCount>> {
    let unread = NotificationRepository::new(state.pool())
        .unread_count(user.id)
        .await?;
    Ok(Json(UnreadCount { unread }))
}

/// Mark one of the caller's notifications read; other users' ids are 404.
pub async fn mark_read(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<MarkedRead>> {
    NotificationRepository::new(state.pool())
        .mark_read(user.id, id)
        .await?;
    Ok(Json(MarkedRead { updated: 1 }))
}

pub async fn mark_all_read(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<MarkedRead>> {
    let updated = NotificationRepository::new(state.pool())
        .mark_all_read(user.id)
        .await?;
    Ok(Json(MarkedRead { updated }))
}
