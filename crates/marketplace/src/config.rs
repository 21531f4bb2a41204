//! Marketplace configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKETPLACE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MARKETPLACE_BASE_URL` - Public URL of the API, used in emails and webhooks
//! - `JWT_SECRET` - Token signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `MARKETPLACE_HOST` - Bind address (default: 0.0.0.0)
//! - `MARKETPLACE_PORT` - Listen port (default: 8000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE` -
//!   Sentry tuning (rates default to 1.0)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM_EMAIL` -
//!   outgoing email; disabled unless `SMTP_HOST` is set
//! - `SMS_API_URL`, `SMS_API_KEY`, `SMS_SENDER` - SMS gateway; disabled unless
//!   `SMS_API_URL` is set
//! - `CAMPAY_BASE_URL`, `CAMPAY_TOKEN`, `CAMPAY_WEBHOOK_SECRET` - Campay mobile
//!   money; disabled unless `CAMPAY_TOKEN` is set
//! - `COMMISSION_RATE` - Listing commission rate (default: 0.08)
//! - `RECOMMENDATION_TTL_HOURS` - Lifetime of persisted recommendations (default: 24)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use vide_grenier_core::commission::LISTING_COMMISSION_RATE;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_CAMPAY_BASE_URL: &str = "https://demo.campay.net/api";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Marketplace application configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: String,
    /// HS256 signing secret for access and refresh tokens
    pub jwt_secret: SecretString,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name (e.g., "production", "staging")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry performance traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// Emit logs as JSON lines instead of text
    pub json_logs: bool,
    /// Outgoing email, when configured
    pub email: Option<EmailConfig>,
    /// SMS gateway, when configured
    pub sms: Option<SmsConfig>,
    /// Campay mobile money, when configured
    pub campay: Option<CampayConfig>,
    /// Commission rate shown on client listings
    pub commission_rate: Decimal,
    /// Lifetime of persisted recommendations, in hours
    pub recommendation_ttl_hours: i64,
}

/// SMTP configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// HTTP SMS gateway configuration.
#[derive(Clone)]
pub struct SmsConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub sender: String,
}

impl std::fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("sender", &self.sender)
            .finish()
    }
}

/// Campay collection API configuration.
#[derive(Clone)]
pub struct CampayConfig {
    pub base_url: String,
    pub token: SecretString,
    /// Shared secret for webhook signatures. Webhooks are refused without it.
    pub webhook_secret: Option<SecretString>,
}

impl std::fmt::Debug for CampayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampayConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl MarketplaceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MARKETPLACE_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("MARKETPLACE_HOST", "0.0.0.0")?;
        let port = parse_env_or_default::<u16>("MARKETPLACE_PORT", "8000")?;
        let base_url = get_required_env("MARKETPLACE_BASE_URL")?;
        let jwt_secret = get_validated_secret("JWT_SECRET")?;
        validate_secret_length(&jwt_secret, "JWT_SECRET")?;

        let commission_rate = parse_env_or_default::<Decimal>(
            "COMMISSION_RATE",
            &LISTING_COMMISSION_RATE.to_string(),
        )?;
        if commission_rate < Decimal::ZERO || commission_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidEnvVar(
                "COMMISSION_RATE".to_string(),
                format!("must be in [0, 1), got {commission_rate}"),
            ));
        }
        let recommendation_ttl_hours =
            parse_env_or_default::<i64>("RECOMMENDATION_TTL_HOURS", "24")?;
        if recommendation_ttl_hours <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "RECOMMENDATION_TTL_HOURS".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            jwt_secret,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_sample_rate("SENTRY_SAMPLE_RATE"),
            sentry_traces_sample_rate: parse_sample_rate("SENTRY_TRACES_SAMPLE_RATE"),
            json_logs: get_optional_env("LOG_FORMAT")
                .is_some_and(|f| f.eq_ignore_ascii_case("json")),
            email: EmailConfig::from_env()?,
            sms: SmsConfig::from_env()?,
            campay: CampayConfig::from_env()?,
            commission_rate,
            recommendation_ttl_hours,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env_or_default::<u16>("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_env_or_default(
                "SMTP_FROM_EMAIL",
                "Vide-Grenier Kamer <noreply@videgrenierkamer.cm>",
            ),
        }))
    }
}

impl SmsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(api_url) = get_optional_env("SMS_API_URL") else {
            return Ok(None);
        };
        Ok(Some(Self {
            api_url,
            api_key: get_validated_secret("SMS_API_KEY")?,
            sender: get_env_or_default("SMS_SENDER", "VGKamer"),
        }))
    }
}

impl CampayConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(token) = get_optional_env("CAMPAY_TOKEN") else {
            return Ok(None);
        };
        validate_secret_strength(&token, "CAMPAY_TOKEN")?;
        let webhook_secret = match get_optional_env("CAMPAY_WEBHOOK_SECRET") {
            Some(value) => {
                validate_secret_strength(&value, "CAMPAY_WEBHOOK_SECRET")?;
                Some(SecretString::from(value))
            }
            None => None,
        };
        Ok(Some(Self {
            base_url: get_env_or_default("CAMPAY_BASE_URL", DEFAULT_CAMPAY_BASE_URL),
            token: SecretString::from(token),
            webhook_secret,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a Sentry sample rate, defaulting to 1.0 when unset or unparseable.
fn parse_sample_rate(key: &str) -> f32 {
    get_optional_env(key)
        .and_then(|s| s.parse::<f32>().ok())
        .map_or(1.0, |rate| rate.clamp(0.0, 1.0))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, using `default` when it is unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> MarketplaceConfig {
        MarketplaceConfig {
            database_url: SecretString::from("postgres://localhost/vgk_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8000,
            base_url: "http://localhost:8000".to_string(),
            jwt_secret: SecretString::from("k".repeat(32)),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
            json_logs: false,
            email: None,
            sms: None,
            campay: None,
            commission_rate: LISTING_COMMISSION_RATE,
            recommendation_ttl_hours: 24,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-jwt-key-here", "JWT_SECRET").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength(&"z".repeat(40), "JWT_SECRET");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "JWT_SECRET").is_ok());
    }

    #[test]
    fn test_validate_secret_length() {
        assert!(validate_secret_length(&SecretString::from("short"), "JWT_SECRET").is_err());
        assert!(validate_secret_length(&SecretString::from("a".repeat(32)), "JWT_SECRET").is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let addr = config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let email = EmailConfig {
            smtp_host: "smtp.videgrenierkamer.cm".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("hunter2-smtp-pass"),
            from_address: "noreply@videgrenierkamer.cm".to_string(),
        };
        let sms = SmsConfig {
            api_url: "https://sms.example.cm/send".to_string(),
            api_key: SecretString::from("sms-key-value-123"),
            sender: "VGKamer".to_string(),
        };
        let campay = CampayConfig {
            base_url: DEFAULT_CAMPAY_BASE_URL.to_string(),
            token: SecretString::from("campay-token-value"),
            webhook_secret: Some(SecretString::from("campay-hook-value")),
        };

        let output = format!("{email:?} {sms:?} {campay:?}");
        assert!(output.contains("smtp.videgrenierkamer.cm"));
        assert!(output.contains("VGKamer"));
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("hunter2-smtp-pass"));
        assert!(!output.contains("sms-key-value-123"));
        assert!(!output.contains("campay-token-value"));
        assert!(!output.contains("campay-hook-value"));
    }
}
