//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! vgk-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `MARKETPLACE_DATABASE_URL` - `PostgreSQL` connection string (falls back
//!   to `DATABASE_URL`)
//!
//! Migrations live in `crates/marketplace/migrations/` and are embedded at
//! compile time.

use sqlx::PgPool;

use super::CommandError;

/// Run marketplace database migrations.
///
/// Only the database URL is needed, so this works before the rest of the
/// configuration exists.
///
/// # Errors
///
/// Returns an error if the URL is missing, the connection fails, or a
/// migration fails.
pub async fn run() -> Result<(), CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("MARKETPLACE_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| CommandError::MissingEnvVar("MARKETPLACE_DATABASE_URL"))?;

    tracing::info!("Connecting to marketplace database...");
    let pool = PgPool::connect(&database_url).await?;

    tracing::info!("Running marketplace migrations...");
    sqlx::migrate!("../marketplace/migrations").run(&pool).await?;

    tracing::info!("Marketplace migrations complete!");
    Ok(())
}
