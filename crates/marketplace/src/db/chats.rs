//! Chat and message repositories.

use sqlx::PgPool;
use tracing::instrument;

use vide_grenier_core::{ChatId, MessageId, MessageKind, ProductId, UserId, Xaf};

use super::RepositoryError;
use crate::models::{Chat, ChatSummary, Message};

const CHAT_COLUMNS: &str =
    "c.id, c.product_id, c.buyer_id, c.seller_id, c.is_active, c.last_message_at, c.created_at";
const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, kind, content, offer_amount, image_url, is_read, read_at, created_at";

/// A message about to be stored.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: &'a str,
    pub offer_amount: Option<Xaf>,
    pub image_url: Option<&'a str>,
}

/// Repository for chats and their messages.
pub struct ChatRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ChatRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Return the chat for `(product, buyer, seller)`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        product: ProductId,
        buyer: UserId,
        seller: UserId,
    ) -> Result<Chat, RepositoryError> {
        let sql = format!(
            "INSERT INTO chats AS c (id, product_id, buyer_id, seller_id) VALUES ($1, $2, $3, $4)
             ON CONFLICT (product_id, buyer_id, seller_id) DO UPDATE SET is_active = TRUE
             RETURNING {CHAT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Chat>(&sql)
            .bind(ChatId::generate())
            .bind(product)
            .bind(buyer)
            .bind(seller)
            .fetch_one(self.pool)
            .await?)
    }

    /// Get a chat by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ChatId) -> Result<Option<Chat>, RepositoryError> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = $1");
        Ok(sqlx::query_as::<_, Chat>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?)
    }

    /// A user's conversations with unread counts, most recent activity first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn inbox(&self, user: UserId) -> Result<Vec<ChatSummary>, RepositoryError> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS}, p.title AS product_title,
                    (SELECT COUNT(*) FROM messages m
                     WHERE m.chat_id = c.id AND m.sender_id <> $1 AND NOT m.is_read) AS unread_count
             FROM chats c JOIN products p ON p.id = c.product_id
             WHERE (c.buyer_id = $1 OR c.seller_id = $1) AND c.is_active
             ORDER BY COALESCE(c.last_message_at, c.created_at) DESC"
        );
        Ok(sqlx::query_as::<_, ChatSummary>(&sql)
            .bind(user)
            .fetch_all(self.pool)
            .await?)
    }

    /// Messages of a chat, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn messages(
        &self,
        chat: ChatId,
        limit: i64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            "SELECT * FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = $1
                ORDER BY created_at DESC LIMIT $2
             ) recent ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, Message>(&sql)
            .bind(chat)
            .bind(limit)
            .fetch_all(self.pool)
            .await?)
    }

    /// Store a message and bump the chat's activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, new), fields(chat = %new.chat_id))]
    pub async fn add_message(&self, new: &NewMessage<'_>) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO messages (id, chat_id, sender_id, kind, content, offer_amount, image_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {MESSAGE_COLUMNS}"
        );
        let message = sqlx::query_as::<_, Message>(&sql)
            .bind(MessageId::generate())
            .bind(new.chat_id)
            .bind(new.sender_id)
            .bind(new.kind)
            .bind(new.content)
            .bind(new.offer_amount)
            .bind(new.image_url)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE chats SET last_message_at = $2 WHERE id = $1")
            .bind(new.chat_id)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(message)
    }

    /// Mark every message `reader` received in a chat as read.
    /// Returns the IDs that changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_read(
        &self,
        chat: ChatId,
        reader: UserId,
    ) -> Result<Vec<MessageId>, RepositoryError> {
        Ok(sqlx::query_scalar(
            "UPDATE messages SET is_read = TRUE, read_at = NOW()
             WHERE chat_id = $1 AND sender_id <> $2 AND NOT is_read
             RETURNING id",
        )
        .bind(chat)
        .bind(reader)
        .fetch_all(self.pool)
        .await?)
    }

    /// Total unread messages across a user's chats.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unread_total(&self, user: UserId) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages m JOIN chats c ON c.id = m.chat_id
             WHERE (c.buyer_id = $1 OR c.seller_id = $1) AND m.sender_id <> $1 AND NOT m.is_read",
        )
        .bind(user)
        .fetch_one(self.pool)
        .await?)
    }
}
