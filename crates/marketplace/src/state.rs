//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::MarketplaceConfig;
use crate::services::auth::JwtKeys;
use crate::services::payments::CampayError;
use crate::services::sms::SmsError;
use crate::services::{
    CampayClient, ChatHub, EmailService, Notifier, RecommendationService, SmsClient,
};

/// Error building the external clients at startup.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("SMTP configuration error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("SMS configuration error: {0}")]
    Sms(#[from] SmsError),
    #[error("Campay configuration error: {0}")]
    Campay(#[from] CampayError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Per-request services borrow the pool and the
/// long-lived pieces held here.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: MarketplaceConfig,
    pool: PgPool,
    jwt: JwtKeys,
    notifier: Notifier,
    recommendations: RecommendationService,
    chat_hub: ChatHub,
    campay: Option<CampayClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Email, SMS and Campay clients are built only when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured client cannot be built.
    pub fn new(config: MarketplaceConfig, pool: PgPool) -> Result<Self, StateError> {
        let email = config
            .email
            .as_ref()
            .map(|c| EmailService::new(c, &config.base_url))
            .transpose()?;
        let sms = config.sms.as_ref().map(SmsClient::new).transpose()?;
        let campay = config.campay.as_ref().map(CampayClient::new).transpose()?;

        let jwt = JwtKeys::new(&config.jwt_secret);
        let notifier = Notifier::new(pool.clone(), email, sms);
        let recommendations =
            RecommendationService::new(pool.clone(), config.recommendation_ttl_hours);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                jwt,
                notifier,
                recommendations,
                chat_hub: ChatHub::new(),
                campay,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &MarketplaceConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Token signing and verification keys.
    #[must_use]
    pub fn jwt(&self) -> &JwtKeys {
        &self.inner.jwt
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    #[must_use]
    pub fn recommendations(&self) -> &RecommendationService {
        &self.inner.recommendations
    }

    /// Live chat rooms for this process.
    #[must_use]
    pub fn chat_hub(&self) -> &ChatHub {
        &self.inner.chat_hub
    }

    /// The Campay client, when mobile money is configured.
    #[must_use]
    pub fn campay(&self) -> Option<&CampayClient> {
        self.inner.campay.as_ref()
    }

    /// The email service, when SMTP is configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.notifier.email()
    }
}
