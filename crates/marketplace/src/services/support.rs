//! Customer support: tickets opened by customers and answered by the
//! back-office.
//!
//! A ticket's status tracks who spoke last. A customer message moves it to
//! WAITING, a back-office reply to RESPONDED. Closed tickets take no more
//! messages.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use vide_grenier_core::{
    NotificationKind, StateMachine, SupportCategory, SupportStatus, SupportTicketId, TaskPriority,
    TransitionError, UserId,
};

use super::chat::MAX_MESSAGE_LENGTH;
use super::notifier::Notifier;
use crate::db::support::{NewTicket, SupportRepository};
use crate::db::users::UserRepository;
use crate::db::{Page, RepositoryError};
use crate::models::{SupportMessage, SupportThread, SupportTicket};

pub const MAX_SUBJECT_LENGTH: usize = 200;

#[derive(Debug, Error)]
pub enum SupportError {
    #[error("support ticket not found")]
    NotFound,

    #[error("support ticket is closed")]
    Closed,

    #[error("tickets can only be assigned to staff or admins")]
    InvalidAssignee,

    #[error("{0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A new ticket as submitted by a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketForm {
    pub subject: String,
    #[serde(default = "default_category")]
    pub category: SupportCategory,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    pub message: String,
}

const fn default_category() -> SupportCategory {
    SupportCategory::General
}

const fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

/// Ticket count per status, for the back-office dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupportStats {
    pub open: i64,
    pub waiting: i64,
    pub responded: i64,
    pub closed: i64,
}

impl SupportStats {
    #[must_use]
    pub fn from_counts(counts: &[(SupportStatus, i64)]) -> Self {
        let mut stats = Self::default();
        for &(status, count) in counts {
            let slot = match status {
                SupportStatus::Open => &mut stats.open,
                SupportStatus::Waiting => &mut stats.waiting,
                SupportStatus::Responded => &mut stats.responded,
                SupportStatus::Closed => &mut stats.closed,
            };
            *slot += count;
        }
        stats
    }
}

/// Support service.
pub struct SupportService<'a> {
    tickets: SupportRepository<'a>,
    users: UserRepository<'a>,
    notifier: &'a Notifier,
}

impl<'a> SupportService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, notifier: &'a Notifier) -> Self {
        Self {
            tickets: SupportRepository::new(pool),
            users: UserRepository::new(pool),
            notifier,
        }
    }

    /// Open a ticket with its first message.
    ///
    /// # Errors
    ///
    /// Returns `SupportError::Invalid` for a blank or oversized subject or
    /// message.
    #[instrument(skip(self, form), fields(category = %form.category))]
    pub async fn open(
        &self,
        user: UserId,
        form: &TicketForm,
    ) -> Result<SupportThread, SupportError> {
        let subject = validate_subject(&form.subject)?;
        let message = validate_message(&form.message)?;
        let (ticket, first) = self
            .tickets
            .create(&NewTicket {
                user_id: user,
                subject,
                category: form.category,
                priority: form.priority,
                message,
            })
            .await?;
        tracing::info!(
            ticket_id = %ticket.id,
            priority = %ticket.priority,
            "Support ticket opened"
        );
        Ok(SupportThread {
            ticket,
            messages: vec![first],
        })
    }

    /// The customer's own tickets.
    ///
    /// # Errors
    ///
    /// Returns `SupportError::Repository` if the query fails.
    pub async fn mine(&self, user: UserId) -> Result<Vec<SupportTicket>, SupportError> {
        Ok(self.tickets.for_user(user).await?)
    }

    /// The back-office queue, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `SupportError::Repository` if the query fails.
    pub async fn queue(
        &self,
        status: Option<SupportStatus>,
        page: Page,
    ) -> Result<Vec<SupportTicket>, SupportError> {
        Ok(self.tickets.queue(status, page).await?)
    }

    /// A ticket and its messages. Reading marks the other side's messages
    /// read.
    ///
    /// # Errors
    ///
    /// Returns `SupportError::NotFound` for unknown tickets and for tickets
    /// of other customers.
    pub async fn thread(
        &self,
        id: SupportTicketId,
        reader: UserId,
        is_staff: bool,
    ) -> Result<SupportThread, SupportError> {
        let ticket = self.visible(id, reader, is_staff).await?;
        self.tickets.mark_read(ticket.id, is_staff).await?;
        let messages = self.tickets.messages(ticket.id).await?;
        Ok(SupportThread { ticket, messages })
    }

    /// Add a message. Back-office replies notify the customer.
    ///
    /// # Errors
    ///
    /// Returns `SupportError::Closed` for closed tickets and
    /// `SupportError::Invalid` for a blank or oversized message.
    #[instrument(skip(self, content))]
    pub async fn post(
        &self,
        id: SupportTicketId,
        sender: UserId,
        is_staff: bool,
        content: &str,
    ) -> Result<SupportMessage, SupportError> {
        let content = validate_message(content)?;
        let ticket = self.visible(id, sender, is_staff).await?;
        let next = next_status(ticket.status, is_staff)?;
        let (ticket, message) = self
            .tickets
            .add_message(ticket.id, sender, is_staff, content, ticket.status, next)
            .await?;

        if is_staff && ticket.user_id != sender {
            self.notifier
                .notify(
                    ticket.user_id,
                    NotificationKind::System,
                    "Réponse du support",
                    &format!("Le support a répondu à votre demande : {}", ticket.subject),
                    serde_json::json!({ "ticket_id": ticket.id, "message_id": message.id }),
                )
                .await;
        }
        Ok(message)
    }

    /// Close a ticket. Customers close their own, the back-office any.
    ///
    /// # Errors
    ///
    /// Returns `SupportError::Transition` if the ticket is already closed.
    #[instrument(skip(self))]
    pub async fn close(
        &self,
        id: SupportTicketId,
        user: UserId,
        is_staff: bool,
    ) -> Result<SupportTicket, SupportError> {
        let ticket = self.visible(id, user, is_staff).await?;
        let next = ticket.status.transition(SupportStatus::Closed)?;
        let closed = self.tickets.set_status(ticket.id, ticket.status, next).await?;
        tracing::info!(ticket_id = %closed.id, "Support ticket closed");
        Ok(closed)
    }

    /// Hand a ticket to a back-office account.
    ///
    /// # Errors
    ///
    /// Returns `SupportError::InvalidAssignee` unless `assignee` is an active
    /// staff or admin account.
    #[instrument(skip(self))]
    pub async fn assign(
        &self,
        id: SupportTicketId,
        assignee: UserId,
    ) -> Result<SupportTicket, SupportError> {
        let account = self.users.get_by_id(assignee).await?;
        if !account.is_some_and(|u| u.is_active && u.user_type.is_staff_or_admin()) {
            return Err(SupportError::InvalidAssignee);
        }
        let ticket = self
            .tickets
            .assign(id, assignee)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => SupportError::NotFound,
                other => SupportError::Repository(other),
            })?;
        self.notifier
            .notify(
                assignee,
                NotificationKind::System,
                "Ticket assigné",
                &format!("Un ticket de support vous a été assigné : {}", ticket.subject),
                serde_json::json!({ "ticket_id": ticket.id }),
            )
            .await;
        Ok(ticket)
    }

    /// # Errors
    ///
    /// Returns `SupportError::Repository` if the query fails.
    pub async fn stats(&self) -> Result<SupportStats, SupportError> {
        Ok(SupportStats::from_counts(&self.tickets.status_counts().await?))
    }

    async fn visible(
        &self,
        id: SupportTicketId,
        user: UserId,
        is_staff: bool,
    ) -> Result<SupportTicket, SupportError> {
        self.tickets
            .get(id)
            .await?
            .filter(|t| t.is_visible_to(user, is_staff))
            .ok_or(SupportError::NotFound)
    }
}

/// Status a ticket moves to when `from_staff` posts. `None` keeps it.
fn next_status(
    current: SupportStatus,
    from_staff: bool,
) -> Result<Option<SupportStatus>, SupportError> {
    if current.is_terminal() {
        return Err(SupportError::Closed);
    }
    match current.after_message(from_staff) {
        Some(next) => Ok(Some(current.transition(next)?)),
        None => Ok(None),
    }
}

fn validate_subject(subject: &str) -> Result<&str, SupportError> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(SupportError::Invalid("subject is required"));
    }
    if subject.chars().count() > MAX_SUBJECT_LENGTH {
        return Err(SupportError::Invalid("subject is too long"));
    }
    Ok(subject)
}

fn validate_message(content: &str) -> Result<&str, SupportError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(SupportError::Invalid("message is required"));
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(SupportError::Invalid("message is too long"));
    }
    Ok(content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn ticket(owner: UserId) -> SupportTicket {
        SupportTicket {
            id: SupportTicketId::generate(),
            user_id: owner,
            subject: "Remboursement".to_owned(),
            category: SupportCategory::Billing,
            priority: TaskPriority::High,
            status: SupportStatus::Open,
            assigned_to: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn test_conversation_alternates_status() {
        let mut status = SupportStatus::Open;
        for (from_staff, expected) in [
            (false, SupportStatus::Waiting),
            (false, SupportStatus::Waiting),
            (true, SupportStatus::Responded),
            (true, SupportStatus::Responded),
            (false, SupportStatus::Waiting),
        ] {
            if let Some(next) = next_status(status, from_staff).unwrap() {
                status = next;
            }
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_closed_ticket_takes_no_messages() {
        assert!(matches!(next_status(SupportStatus::Closed, false), Err(SupportError::Closed)));
        assert!(matches!(next_status(SupportStatus::Closed, true), Err(SupportError::Closed)));
    }

    #[test]
    fn test_tickets_are_private_to_owner_and_staff() {
        let owner = UserId::generate();
        let ticket = ticket(owner);
        assert!(ticket.is_visible_to(owner, false));
        assert!(ticket.is_visible_to(UserId::generate(), true));
        assert!(!ticket.is_visible_to(UserId::generate(), false));
    }

    #[test]
    fn test_validation() {
        assert_eq!(validate_subject("  Colis non reçu ").unwrap(), "Colis non reçu");
        assert!(validate_subject(" ").is_err());
        assert!(validate_subject(&"x".repeat(MAX_SUBJECT_LENGTH + 1)).is_err());
        assert!(validate_message("").is_err());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_form_defaults() {
        let form: TicketForm = serde_json::from_value(serde_json::json!({
            "subject": "Question",
            "message": "Comment vendre un meuble ?",
        }))
        .unwrap();
        assert_eq!(form.category, SupportCategory::General);
        assert_eq!(form.priority, TaskPriority::Medium);
    }

    #[test]
    fn test_stats_from_counts() {
        let stats = SupportStats::from_counts(&[
            (SupportStatus::Waiting, 4),
            (SupportStatus::Closed, 9),
        ]);
        assert_eq!(
            stats,
            SupportStats {
                open: 0,
                waiting: 4,
                responded: 0,
                closed: 9,
            }
        );
    }
}
