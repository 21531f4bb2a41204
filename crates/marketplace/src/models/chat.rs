//! Conversations between a buyer and a seller about a product.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vide_grenier_core::{ChatId, MessageId, MessageKind, ProductId, UserId, Xaf};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Chat {
    pub id: ChatId,
    pub product_id: ProductId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub is_active: bool,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    #[must_use]
    pub fn is_participant(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }

    /// The participant who is not `user`.
    #[must_use]
    pub fn other_participant(&self, user: UserId) -> UserId {
        if self.buyer_id == user {
            self.seller_id
        } else {
            self.buyer_id
        }
    }
}

/// A chat in the inbox, with the product title and the reader's unread count.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub chat: Chat,
    pub product_title: String,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: String,
    pub offer_amount: Option<Xaf>,
    pub image_url: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
