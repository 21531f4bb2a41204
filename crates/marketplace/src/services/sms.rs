//! SMS gateway client.
//!
//! Posts `{"to", "from", "message"}` as JSON to the configured gateway with a
//! bearer key. Any non-2xx answer is an error; the notifier falls back to
//! email in that case.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;

use vide_grenier_core::Phone;

use crate::config::SmsConfig;

/// Errors that can occur when sending an SMS.
#[derive(Debug, Error)]
pub enum SmsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway answered with an error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// API key is not a valid header value.
    #[error("invalid API key format")]
    InvalidKey,
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    from: &'a str,
    message: &'a str,
}

/// HTTP SMS client.
#[derive(Clone)]
pub struct SmsClient {
    client: reqwest::Client,
    api_url: String,
    sender: String,
}

impl SmsClient {
    /// Create a client for the configured gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &SmsConfig) -> Result<Self, SmsError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|_| SmsError::InvalidKey)?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            sender: config.sender.clone(),
        })
    }

    /// Send one text message.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the gateway rejects it.
    #[tracing::instrument(skip(self, message), fields(to = %to))]
    pub async fn send(&self, to: &Phone, message: &str) -> Result<(), SmsError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&SmsRequest {
                to: to.as_str(),
                from: &self.sender,
                message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SmsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!("SMS sent");
        Ok(())
    }
}
