//! In-app notification repository.

use sqlx::PgPool;

use vide_grenier_core::{NotificationId, NotificationKind, UserId};

use super::{Page, RepositoryError};
use crate::models::Notification;

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, data, is_read, created_at";

pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a notification.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        user: UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: &serde_json::Value,
    ) -> Result<Notification, RepositoryError> {
        let sql = format!(
            "INSERT INTO notifications (id, user_id, kind, title, message, data)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Notification>(&sql)
            .bind(NotificationId::generate())
            .bind(user)
            .bind(kind)
            .bind(title)
            .bind(message)
            .bind(data)
            .fetch_one(self.pool)
            .await?)
    }

    /// A user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        user: UserId,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE user_id = $1 AND (NOT $2 OR NOT is_read)
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        );
        Ok(sqlx::query_as::<_, Notification>(&sql)
            .bind(user)
            .bind(unread_only)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?)
    }

    /// Number of unread notifications.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unread_count(&self, user: UserId) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user)
        .fetch_one(self.pool)
        .await?)
    }

    /// Mark one notification as read.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it does not belong to `user`.
    pub async fn mark_read(&self, user: UserId, id: NotificationId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user)
                .execute(self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Mark all of a user's notifications as read. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_all_read(&self, user: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
