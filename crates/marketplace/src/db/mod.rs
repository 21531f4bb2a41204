//! Database operations for the marketplace `PostgreSQL`.
//!
//! Every repository borrows the pool (`XRepository::new(&pool)`) and runs
//! runtime-checked `sqlx` queries. Status and vocabulary columns are
//! Postgres enums mapped by the core types.
//!
//! ## Tables
//!
//! - `users`, `verification_codes` - accounts, phone and 2FA codes
//! - `categories`, `products`, `product_images`, `favorites`, `wishlists`
//! - `orders`, `payments`, `reviews`, `visitor_carts`, `visitor_cart_items`
//! - `chats`, `messages`, `notifications`
//! - `pickup_points`, `admin_stock`, `staff_tasks`, `inventory_movements`
//! - `user_behaviors`, `product_recommendations`, `analytics_events`, `search_history`
//! - `wallets`, `wallet_transactions`, `escrow_payments`, `installment_plans`,
//!   `installment_payments`, `payouts`
//! - `newsletter_subscribers`, `newsletters`
//! - `support_tickets`, `support_messages`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/marketplace/migrations/` and run via:
//! ```bash
//! cargo run -p vide-grenier-cli -- migrate
//! ```

pub mod analytics;
pub mod backoffice;
pub mod carts;
pub mod catalog;
pub mod chats;
pub mod dashboard;
pub mod finance;
pub mod newsletter;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod support;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Unique constraint violation.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to [`RepositoryError::Conflict`], anything else
    /// to [`RepositoryError::Database`].
    pub(crate) fn from_unique(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Page of results requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl Page {
    pub const DEFAULT_SIZE: i64 = 20;
    pub const MAX_SIZE: i64 = 100;

    /// Clamp client input: page numbers start at 1, sizes at 1 up to 100.
    #[must_use]
    pub fn new(number: Option<i64>, size: Option<i64>) -> Self {
        Self {
            number: number.unwrap_or(1).max(1),
            size: size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE),
        }
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.number - 1) * self.size
    }

    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.size
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_clamping() {
        let page = Page::default();
        assert_eq!((page.number, page.size), (1, 20));

        let page = Page::new(Some(0), Some(500));
        assert_eq!((page.number, page.size), (1, 100));

        let page = Page::new(Some(3), Some(10));
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), 10);
    }

    #[test]
    fn test_repository_error_display() {
        assert_eq!(RepositoryError::NotFound.to_string(), "not found");
        assert_eq!(
            RepositoryError::Conflict("email".to_string()).to_string(),
            "conflict: email"
        );
    }
}
