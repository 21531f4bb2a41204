use chrono::{DateTime, Utc};
use serde::Serialize;

use vide_grenier_core::{Email, NewsletterId, SubscriberId, UserId};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub email: Email,
    pub name: Option<String>,
    pub is_active: bool,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

/// An email campaign.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Newsletter {
    pub id: NewsletterId,
    pub subject: String,
    pub content: String,
    pub created_by: Option<UserId>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub recipients_count: i32,
    pub created_at: DateTime<Utc>,
}
