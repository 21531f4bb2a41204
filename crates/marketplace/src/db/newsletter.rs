//! Newsletter subscribers and campaigns.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use vide_grenier_core::{Email, NewsletterId, SubscriberId, UserId};

use super::RepositoryError;
use crate::models::{Newsletter, Subscriber};

const SUBSCRIBER_COLUMNS: &str = "id, email, name, is_active, subscribed_at, unsubscribed_at";
const NEWSLETTER_COLUMNS: &str = "id, subject, content, created_by, scheduled_for, is_sent, \
     sent_at, recipients_count, created_at";

pub struct NewsletterRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NewsletterRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Subscribe an address, reactivating it if it had unsubscribed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn subscribe(
        &self,
        email: &Email,
        name: Option<&str>,
    ) -> Result<Subscriber, RepositoryError> {
        let sql = format!(
            "INSERT INTO newsletter_subscribers (id, email, name) VALUES ($1, $2, $3)
             ON CONFLICT (email) DO UPDATE SET
                is_active = TRUE,
                unsubscribed_at = NULL,
                name = COALESCE(EXCLUDED.name, newsletter_subscribers.name)
             RETURNING {SUBSCRIBER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Subscriber>(&sql)
            .bind(SubscriberId::generate())
            .bind(email)
            .bind(name)
            .fetch_one(self.pool)
            .await?)
    }

    /// Deactivate an address. Unknown or already inactive addresses are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unsubscribe(&self, email: &Email) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE newsletter_subscribers SET is_active = FALSE, unsubscribed_at = NOW()
             WHERE email = $1 AND is_active",
        )
        .bind(email)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Every subscriber, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn subscribers(&self, active_only: bool) -> Result<Vec<Subscriber>, RepositoryError> {
        let sql = format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM newsletter_subscribers
             WHERE is_active OR NOT $1 ORDER BY subscribed_at DESC"
        );
        Ok(sqlx::query_as::<_, Subscriber>(&sql)
            .bind(active_only)
            .fetch_all(self.pool)
            .await?)
    }

    /// Draft a campaign.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        subject: &str,
        content: &str,
        created_by: UserId,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Newsletter, RepositoryError> {
        let sql = format!(
            "INSERT INTO newsletters (id, subject, content, created_by, scheduled_for)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {NEWSLETTER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Newsletter>(&sql)
            .bind(NewsletterId::generate())
            .bind(subject)
            .bind(content)
            .bind(created_by)
            .bind(scheduled_for)
            .fetch_one(self.pool)
            .await?)
    }

    /// Get a campaign by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: NewsletterId) -> Result<Option<Newsletter>, RepositoryError> {
        let sql = format!("SELECT {NEWSLETTER_COLUMNS} FROM newsletters WHERE id = $1");
        Ok(sqlx::query_as::<_, Newsletter>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// Every campaign, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Newsletter>, RepositoryError> {
        let sql = format!("SELECT {NEWSLETTER_COLUMNS} FROM newsletters ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Newsletter>(&sql)
            .fetch_all(self.pool)
            .await?)
    }

    /// Unsent campaigns whose schedule has arrived (or that have none).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn pending(&self, now: DateTime<Utc>) -> Result<Vec<Newsletter>, RepositoryError> {
        let sql = format!(
            "SELECT {NEWSLETTER_COLUMNS} FROM newsletters
             WHERE NOT is_sent AND (scheduled_for IS NULL OR scheduled_for <= $1)
             ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, Newsletter>(&sql)
            .bind(now)
            .fetch_all(self.pool)
            .await?)
    }

    /// Claim a campaign for sending. Returns `false` if it was already sent,
    /// so two senders never deliver the same campaign.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn claim_for_sending(&self, id: NewsletterId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE newsletters SET is_sent = TRUE, sent_at = NOW() WHERE id = $1 AND NOT is_sent",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Store how many subscribers received a campaign.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_recipients(
        &self,
        id: NewsletterId,
        count: i32,
    ) -> Result<Newsletter, RepositoryError> {
        let sql = format!(
            "UPDATE newsletters SET recipients_count = $2 WHERE id = $1
             RETURNING {NEWSLETTER_COLUMNS}"
        );
        sqlx::query_as::<_, Newsletter>(&sql)
            .bind(id)
            .bind(count)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}
