//! Buyer/seller messaging.
//!
//! [`ChatService`] validates and persists messages. [`ChatHub`] fans frames
//! out to the WebSocket connections open on a chat: one tokio broadcast
//! channel per chat, created on first join and dropped when the last
//! connection leaves.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::{RwLock, broadcast};
use tracing::instrument;

use vide_grenier_core::{ChatId, MessageId, MessageKind, NotificationKind, ProductId, UserId, Xaf};

use super::notifier::Notifier;
use crate::db::RepositoryError;
use crate::db::catalog::ProductRepository;
use crate::db::chats::{ChatRepository, NewMessage};
use crate::models::{Chat, ChatSummary, Message};

/// Longest accepted message body, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Messages returned when a chat is opened.
pub const HISTORY_LIMIT: i64 = 100;

/// Frames buffered per chat before slow receivers start lagging.
const ROOM_CAPACITY: usize = 64;

/// Errors that can occur in the chat service.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat not found")]
    NotFound,

    #[error("product not found")]
    ProductNotFound,

    #[error("you cannot open a chat about your own product")]
    OwnProduct,

    #[error("you are not a participant of this chat")]
    NotParticipant,

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A message as sent by a client, over HTTP or WebSocket.
#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub offer_amount: Option<Xaf>,
    #[serde(default)]
    pub image_url: Option<String>,
}

const fn default_kind() -> MessageKind {
    MessageKind::Text
}

impl OutgoingMessage {
    /// Check the body against its kind. System messages can't be sent by users.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::InvalidMessage` describing the first problem.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ChatError::InvalidMessage("message is too long"));
        }
        match self.kind {
            MessageKind::Text if self.content.trim().is_empty() => {
                Err(ChatError::InvalidMessage("message is empty"))
            }
            MessageKind::Offer if !self.offer_amount.is_some_and(|a| a.is_positive()) => {
                Err(ChatError::InvalidMessage("an offer needs a positive amount"))
            }
            MessageKind::Image
                if self
                    .image_url
                    .as_deref()
                    .is_none_or(|u| url::Url::parse(u).is_err()) =>
            {
                Err(ChatError::InvalidMessage("an image message needs a valid URL"))
            }
            MessageKind::System => Err(ChatError::InvalidMessage("system messages are reserved")),
            _ => Ok(()),
        }
    }
}

/// Frames a client sends over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Message(OutgoingMessage),
    Typing { is_typing: bool },
    ReadReceipt,
}

/// Presence change broadcast in `user_status` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Joined,
    Left,
}

/// Frames the server broadcasts to a chat room.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Message {
        message: Message,
    },
    Typing {
        user_id: UserId,
        is_typing: bool,
    },
    ReadReceipt {
        user_id: UserId,
        message_ids: Vec<MessageId>,
    },
    UserStatus {
        user_id: UserId,
        status: Presence,
    },
    Error {
        error: String,
    },
}

/// In-process room registry.
#[derive(Debug, Default)]
pub struct ChatHub {
    rooms: RwLock<HashMap<ChatId, broadcast::Sender<Arc<ServerFrame>>>>,
}

impl ChatHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room, creating it if needed.
    pub async fn subscribe(&self, chat: ChatId) -> broadcast::Receiver<Arc<ServerFrame>> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(chat)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Broadcast to everyone in the room. Returns how many connections
    /// received the frame; 0 when nobody is connected.
    pub async fn publish(&self, chat: ChatId, frame: ServerFrame) -> usize {
        let rooms = self.rooms.read().await;
        rooms
            .get(&chat)
            .and_then(|tx| tx.send(Arc::new(frame)).ok())
            .unwrap_or(0)
    }

    /// Drop the room once its last receiver is gone. Call after dropping
    /// the receiver returned by [`ChatHub::subscribe`].
    pub async fn release(&self, chat: ChatId) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(&chat).is_some_and(|tx| tx.receiver_count() == 0) {
            rooms.remove(&chat);
        }
    }

    /// Number of rooms with at least one connection.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

/// Chat service.
pub struct ChatService<'a> {
    chats: ChatRepository<'a>,
    products: ProductRepository<'a>,
    notifier: &'a Notifier,
}

impl<'a> ChatService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, notifier: &'a Notifier) -> Self {
        Self {
            chats: ChatRepository::new(pool),
            products: ProductRepository::new(pool),
            notifier,
        }
    }

    /// Open (or reopen) the buyer's chat with the seller of `product`.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::ProductNotFound` or `ChatError::OwnProduct`.
    #[instrument(skip(self))]
    pub async fn open(&self, product: ProductId, buyer: UserId) -> Result<Chat, ChatError> {
        let product = self
            .products
            .get(product)
            .await?
            .ok_or(ChatError::ProductNotFound)?;
        if product.seller_id == buyer {
            return Err(ChatError::OwnProduct);
        }
        Ok(self
            .chats
            .get_or_create(product.id, buyer, product.seller_id)
            .await?)
    }

    /// Load a chat the user takes part in.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::NotFound` or `ChatError::NotParticipant`.
    pub async fn get_for(&self, chat: ChatId, user: UserId) -> Result<Chat, ChatError> {
        let chat = self.chats.get(chat).await?.ok_or(ChatError::NotFound)?;
        if !chat.is_participant(user) {
            return Err(ChatError::NotParticipant);
        }
        Ok(chat)
    }

    /// The user's conversations.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Repository` if the query fails.
    pub async fn inbox(&self, user: UserId) -> Result<Vec<ChatSummary>, ChatError> {
        Ok(self.chats.inbox(user).await?)
    }

    /// Recent messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Repository` if the query fails.
    pub async fn history(&self, chat: &Chat) -> Result<Vec<Message>, ChatError> {
        Ok(self.chats.messages(chat.id, HISTORY_LIMIT).await?)
    }

    /// Persist a message and notify the other participant.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::InvalidMessage` or `ChatError::NotParticipant`.
    #[instrument(skip(self, chat, outgoing), fields(chat_id = %chat.id))]
    pub async fn send(
        &self,
        chat: &Chat,
        sender: UserId,
        outgoing: &OutgoingMessage,
    ) -> Result<Message, ChatError> {
        if !chat.is_participant(sender) {
            return Err(ChatError::NotParticipant);
        }
        outgoing.validate()?;

        let message = self
            .chats
            .add_message(&NewMessage {
                chat_id: chat.id,
                sender_id: sender,
                kind: outgoing.kind,
                content: outgoing.content.trim(),
                offer_amount: outgoing.offer_amount,
                image_url: outgoing.image_url.as_deref(),
            })
            .await?;

        let preview = match message.kind {
            MessageKind::Offer => message
                .offer_amount
                .map_or_else(String::new, |a| format!("Nouvelle offre : {a}")),
            MessageKind::Image => "Photo".to_owned(),
            _ => message.content.chars().take(80).collect(),
        };
        self.notifier
            .notify(
                chat.other_participant(sender),
                NotificationKind::Message,
                "Nouveau message",
                &preview,
                serde_json::json!({ "chat_id": chat.id, "message_id": message.id }),
            )
            .await;

        Ok(message)
    }

    /// Mark the other participant's messages read.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Repository` if the update fails.
    pub async fn mark_read(
        &self,
        chat: &Chat,
        reader: UserId,
    ) -> Result<Vec<MessageId>, ChatError> {
        Ok(self.chats.mark_read(chat.id, reader).await?)
    }

    /// Unread messages across every chat of the user.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Repository` if the query fails.
    pub async fn unread_total(&self, user: UserId) -> Result<i64, ChatError> {
        Ok(self.chats.unread_total(user).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn text(content: &str) -> OutgoingMessage {
        OutgoingMessage {
            kind: MessageKind::Text,
            content: content.to_owned(),
            offer_amount: None,
            image_url: None,
        }
    }

    #[test]
    fn test_validate_messages() {
        assert!(text("Toujours disponible ?").validate().is_ok());
        assert!(text("   ").validate().is_err());
        assert!(text(&"a".repeat(MAX_MESSAGE_LENGTH + 1)).validate().is_err());

        let mut offer = text("");
        offer.kind = MessageKind::Offer;
        assert!(offer.validate().is_err());
        offer.offer_amount = Some(Xaf::new(Decimal::from(15_000)));
        assert!(offer.validate().is_ok());

        let mut image = text("");
        image.kind = MessageKind::Image;
        image.image_url = Some("pas une url".to_owned());
        assert!(image.validate().is_err());
        image.image_url = Some("https://cdn.videgrenierkamer.cm/p/1.jpg".to_owned());
        assert!(image.validate().is_ok());

        let mut system = text("hello");
        system.kind = MessageKind::System;
        assert!(system.validate().is_err());
    }

    #[test]
    fn test_client_frames_parse() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"message","content":"Bonjour"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Message(m) if m.kind == MessageKind::Text));

        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"typing","is_typing":true}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Typing { is_typing: true }));

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"read_receipt"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::ReadReceipt));

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn test_server_frame_shape() {
        let user = UserId::generate();
        let json = serde_json::to_value(ServerFrame::UserStatus {
            user_id: user,
            status: Presence::Joined,
        })
        .unwrap();
        assert_eq!(json["type"], "user_status");
        assert_eq!(json["status"], "joined");
    }

    #[tokio::test]
    async fn test_hub_fan_out_and_cleanup() {
        let hub = ChatHub::new();
        let chat = ChatId::generate();
        let user = UserId::generate();
        let typing = || ServerFrame::Typing {
            user_id: user,
            is_typing: true,
        };

        assert_eq!(hub.publish(chat, typing()).await, 0);

        let mut a = hub.subscribe(chat).await;
        let mut b = hub.subscribe(chat).await;
        assert_eq!(hub.room_count().await, 1);

        let delivered = hub.publish(chat, typing()).await;
        assert_eq!(delivered, 2);
        assert!(matches!(*a.recv().await.unwrap(), ServerFrame::Typing { .. }));
        assert!(matches!(*b.recv().await.unwrap(), ServerFrame::Typing { .. }));

        drop(a);
        hub.release(chat).await;
        assert_eq!(hub.room_count().await, 1);

        drop(b);
        hub.release(chat).await;
        assert_eq!(hub.room_count().await, 0);
    }
}
