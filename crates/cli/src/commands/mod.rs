//! Command implementations.

pub mod accounts;
pub mod jobs;
pub mod migrate;

use thiserror::Error;

use vide_grenier_marketplace::config::{ConfigError, MarketplaceConfig};
use vide_grenier_marketplace::db;
use vide_grenier_marketplace::state::{AppState, StateError};

/// Errors shared by every command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Service setup error: {0}")]
    State(#[from] StateError),

    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    /// Wrap a service error whose type the CLI does not care about.
    pub fn failed(e: impl std::fmt::Display) -> Self {
        Self::Failed(e.to_string())
    }
}

/// Load the marketplace configuration and connect, the same way the server
/// does at startup.
pub async fn connect() -> Result<AppState, CommandError> {
    let config = MarketplaceConfig::from_env()?;
    tracing::info!("Connecting to marketplace database...");
    let pool = db::create_pool(&config.database_url).await?;
    Ok(AppState::new(config, pool)?)
}
