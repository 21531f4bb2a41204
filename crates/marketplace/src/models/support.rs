//! Customer support tickets and their messages.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vide_grenier_core::{
    SupportCategory, SupportMessageId, SupportStatus, SupportTicketId, TaskPriority, UserId,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SupportTicket {
    pub id: SupportTicketId,
    pub user_id: UserId,
    pub subject: String,
    pub category: SupportCategory,
    pub priority: TaskPriority,
    pub status: SupportStatus,
    pub assigned_to: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl SupportTicket {
    /// Ticket owners and back-office accounts may read and answer a ticket.
    #[must_use]
    pub fn is_visible_to(&self, user: UserId, is_staff: bool) -> bool {
        is_staff || self.user_id == user
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SupportMessage {
    pub id: SupportMessageId,
    pub ticket_id: SupportTicketId,
    pub sender_id: UserId,
    pub from_staff: bool,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A ticket with its conversation, oldest message first.
#[derive(Debug, Clone, Serialize)]
pub struct SupportThread {
    #[serde(flatten)]
    pub ticket: SupportTicket,
    pub messages: Vec<SupportMessage>,
}
