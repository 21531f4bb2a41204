//! Support ticket repository.

use sqlx::PgPool;
use tracing::instrument;

use vide_grenier_core::{
    SupportCategory, SupportMessageId, SupportStatus, SupportTicketId, TaskPriority, UserId,
};

use super::{Page, RepositoryError};
use crate::models::{SupportMessage, SupportTicket};

const TICKET_COLUMNS: &str = "id, user_id, subject, category, priority, status, assigned_to, \
     created_at, updated_at, closed_at";
const MESSAGE_COLUMNS: &str = "id, ticket_id, sender_id, from_staff, content, is_read, created_at";

/// Fields of a new ticket and its first message.
#[derive(Debug, Clone)]
pub struct NewTicket<'a> {
    pub user_id: UserId,
    pub subject: &'a str,
    pub category: SupportCategory,
    pub priority: TaskPriority,
    pub message: &'a str,
}

/// Repository for support tickets.
pub struct SupportRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SupportRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Open a ticket with the customer's first message, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if an insert fails.
    #[instrument(skip(self, new), fields(user_id = %new.user_id))]
    pub async fn create(
        &self,
        new: &NewTicket<'_>,
    ) -> Result<(SupportTicket, SupportMessage), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO support_tickets (id, user_id, subject, category, priority)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {TICKET_COLUMNS}"
        );
        let ticket = sqlx::query_as::<_, SupportTicket>(&sql)
            .bind(SupportTicketId::generate())
            .bind(new.user_id)
            .bind(new.subject)
            .bind(new.category)
            .bind(new.priority)
            .fetch_one(&mut *tx)
            .await?;
        let sql = format!(
            "INSERT INTO support_messages (id, ticket_id, sender_id, from_staff, content)
             VALUES ($1, $2, $3, FALSE, $4)
             RETURNING {MESSAGE_COLUMNS}"
        );
        let message = sqlx::query_as::<_, SupportMessage>(&sql)
            .bind(SupportMessageId::generate())
            .bind(ticket.id)
            .bind(new.user_id)
            .bind(new.message)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((ticket, message))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: SupportTicketId) -> Result<Option<SupportTicket>, RepositoryError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM support_tickets WHERE id = $1");
        Ok(sqlx::query_as::<_, SupportTicket>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// A customer's tickets, most recent activity first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_user(&self, user: UserId) -> Result<Vec<SupportTicket>, RepositoryError> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM support_tickets WHERE user_id = $1
             ORDER BY updated_at DESC"
        );
        Ok(sqlx::query_as::<_, SupportTicket>(&sql)
            .bind(user)
            .fetch_all(self.pool)
            .await?)
    }

    /// The support queue: most urgent first, then least recently touched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn queue(
        &self,
        status: Option<SupportStatus>,
        page: Page,
    ) -> Result<Vec<SupportTicket>, RepositoryError> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM support_tickets
             WHERE ($1::support_status IS NULL OR status = $1)
             ORDER BY priority DESC, updated_at
             LIMIT $2 OFFSET $3"
        );
        Ok(sqlx::query_as::<_, SupportTicket>(&sql)
            .bind(status)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn messages(
        &self,
        ticket: SupportTicketId,
    ) -> Result<Vec<SupportMessage>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM support_messages WHERE ticket_id = $1
             ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, SupportMessage>(&sql)
            .bind(ticket)
            .fetch_all(self.pool)
            .await?)
    }

    /// Store a message and move the ticket from `from` to `to` (or just
    /// touch it when `to` is `None`), in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the status changed concurrently.
    #[instrument(skip(self, content))]
    pub async fn add_message(
        &self,
        ticket: SupportTicketId,
        sender: UserId,
        from_staff: bool,
        content: &str,
        from: SupportStatus,
        to: Option<SupportStatus>,
    ) -> Result<(SupportTicket, SupportMessage), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE support_tickets SET status = COALESCE($3, status), updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {TICKET_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, SupportTicket>(&sql)
            .bind(ticket)
            .bind(from)
            .bind(to)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::Conflict(format!("ticket {ticket} status changed")))?;
        let sql = format!(
            "INSERT INTO support_messages (id, ticket_id, sender_id, from_staff, content)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {MESSAGE_COLUMNS}"
        );
        let message = sqlx::query_as::<_, SupportMessage>(&sql)
            .bind(SupportMessageId::generate())
            .bind(ticket)
            .bind(sender)
            .bind(from_staff)
            .bind(content)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((updated, message))
    }

    /// Store a status already validated by the ticket lifecycle.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the status changed concurrently.
    pub async fn set_status(
        &self,
        id: SupportTicketId,
        from: SupportStatus,
        to: SupportStatus,
    ) -> Result<SupportTicket, RepositoryError> {
        let sql = format!(
            "UPDATE support_tickets SET status = $3, updated_at = NOW(),
                closed_at = CASE WHEN $3 = 'closed'::support_status THEN NOW() ELSE closed_at END
             WHERE id = $1 AND status = $2
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, SupportTicket>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| RepositoryError::Conflict(format!("ticket {id} status changed")))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for unknown tickets.
    pub async fn assign(
        &self,
        id: SupportTicketId,
        assignee: UserId,
    ) -> Result<SupportTicket, RepositoryError> {
        let sql = format!(
            "UPDATE support_tickets SET assigned_to = $2, updated_at = NOW() WHERE id = $1
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, SupportTicket>(&sql)
            .bind(id)
            .bind(assignee)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Mark the other side's messages read: staff messages for the
    /// customer, customer messages for staff.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_read(
        &self,
        ticket: SupportTicketId,
        reader_is_staff: bool,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE support_messages SET is_read = TRUE
             WHERE ticket_id = $1 AND from_staff <> $2 AND NOT is_read",
        )
        .bind(ticket)
        .bind(reader_is_staff)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Ticket count per status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status_counts(&self) -> Result<Vec<(SupportStatus, i64)>, RepositoryError> {
        Ok(sqlx::query_as(
            "SELECT status, COUNT(*) FROM support_tickets GROUP BY status ORDER BY status",
        )
        .fetch_all(self.pool)
        .await?)
    }
}
