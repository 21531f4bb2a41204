//! Payment initiation, verification and Campay webhooks.
//!
//! Mobile money goes through the Campay collection API when it is
//! configured. Without it, or when Campay refuses the request, the payment
//! is stored PENDING with a stub provider response so the order can still be
//! settled later (webhook, verification or an administrator).

use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use vide_grenier_core::{
    OrderStatus, PaymentMethod, PaymentStatus, Phone, StateMachine, TransitionError, Xaf,
};

use crate::config::CampayConfig;
use crate::db::RepositoryError;
use crate::db::payments::{NewPayment, PaymentRepository};
use crate::models::{Order, Payment};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of a webhook body.
pub const SIGNATURE_HEADER: &str = "x-campay-signature";

const REFERENCE_PREFIX: &str = "PAY_";
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REFERENCE_LENGTH: usize = 8;

/// Errors from the Campay API.
#[derive(Debug, Error)]
pub enum CampayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Token is not a valid header value.
    #[error("invalid Campay token format")]
    InvalidToken,
}

/// Errors from the payment service.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment not found")]
    NotFound,

    #[error("order is not awaiting payment")]
    OrderNotPayable,

    #[error("{0} payments are handled by their own endpoints")]
    UnsupportedMethod(&'static str),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Campay collection request.
#[derive(Debug, Serialize)]
struct CollectRequest<'a> {
    amount: String,
    currency: &'static str,
    from: &'a str,
    description: &'a str,
    external_reference: &'a str,
}

/// Campay answer to a collection request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectResponse {
    pub reference: String,
    #[serde(default)]
    pub ussd_code: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
}

/// Campay transaction state, as returned by the status endpoint and webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampayStatus {
    Pending,
    Successful,
    Failed,
}

impl CampayStatus {
    /// The payment status this provider state settles to, if final.
    #[must_use]
    pub const fn settled(self) -> Option<PaymentStatus> {
        match self {
            Self::Pending => None,
            Self::Successful => Some(PaymentStatus::Completed),
            Self::Failed => Some(PaymentStatus::Failed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub reference: String,
    pub status: CampayStatus,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub operator_reference: Option<String>,
}

/// Body of a Campay webhook call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Campay's own reference.
    pub reference: String,
    /// Our `PAY_` reference, echoed back.
    #[serde(default)]
    pub external_reference: Option<String>,
    pub status: CampayStatus,
    #[serde(default)]
    pub operator: Option<String>,
}

/// Campay collection API client.
#[derive(Clone)]
pub struct CampayClient {
    client: reqwest::Client,
    base_url: String,
}

impl CampayClient {
    /// Create a new Campay client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CampayConfig) -> Result<Self, CampayError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Token {}", config.token.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|_| CampayError::InvalidToken)?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ask the payer's operator to collect `amount`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Campay rejects it.
    #[instrument(skip(self, description))]
    pub async fn collect(
        &self,
        amount: Xaf,
        payer: &Phone,
        description: &str,
        external_reference: &str,
    ) -> Result<CollectResponse, CampayError> {
        let body = CollectRequest {
            amount: amount.round().amount().to_string(),
            currency: "XAF",
            from: payer.as_str().trim_start_matches('+'),
            description,
            external_reference,
        };
        let response = self
            .client
            .post(format!("{}/collect/", self.base_url))
            .json(&body)
            .send()
            .await?;
        Self::json(response).await
    }

    /// Current state of a collection.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Campay rejects it.
    pub async fn transaction_status(
        &self,
        reference: &str,
    ) -> Result<TransactionStatus, CampayError> {
        let response = self
            .client
            .get(format!("{}/transaction/{reference}/", self.base_url))
            .send()
            .await?;
        Self::json(response).await
    }

    async fn json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CampayError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CampayError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

/// Payment service.
pub struct PaymentService<'a> {
    payments: PaymentRepository<'a>,
    campay: Option<&'a CampayClient>,
}

impl<'a> PaymentService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, campay: Option<&'a CampayClient>) -> Self {
        Self {
            payments: PaymentRepository::new(pool),
            campay,
        }
    }

    /// Start paying a pending order.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::OrderNotPayable` unless the order is PENDING and
    /// `PaymentError::UnsupportedMethod` for wallet and installment payments.
    #[instrument(skip(self, order, payer), fields(order_id = %order.id))]
    pub async fn initiate(
        &self,
        order: &Order,
        payer: &Phone,
        method: PaymentMethod,
    ) -> Result<Payment, PaymentError> {
        if order.status != OrderStatus::Pending {
            return Err(PaymentError::OrderNotPayable);
        }
        if matches!(method, PaymentMethod::Wallet | PaymentMethod::Installment) {
            return Err(PaymentError::UnsupportedMethod(method.as_str()));
        }

        let reference = generate_reference();
        let description = format!("Commande {}", order.order_number);

        let campay_result = match self.campay {
            Some(client) if method.is_mobile_money() => Some(
                client
                    .collect(order.total_amount, payer, &description, &reference)
                    .await,
            ),
            _ => None,
        };

        let (status, provider, provider_reference, provider_response) = match campay_result {
            Some(Ok(collect)) => (
                PaymentStatus::Processing,
                "campay",
                Some(collect.reference.clone()),
                serde_json::to_value(&collect).unwrap_or_default(),
            ),
            Some(Err(e)) => {
                tracing::warn!(error = %e, reference = %reference, "Campay collection failed, keeping payment pending");
                (
                    PaymentStatus::Pending,
                    provider_name(method),
                    None,
                    stub_response(method, Some(&e.to_string())),
                )
            }
            None => (
                PaymentStatus::Pending,
                provider_name(method),
                None,
                stub_response(method, None),
            ),
        };

        Ok(self
            .payments
            .create(&NewPayment {
                order_id: order.id,
                reference: &reference,
                method,
                amount: order.total_amount,
                status,
                provider,
                provider_reference: provider_reference.as_deref(),
                provider_response: &provider_response,
            })
            .await?)
    }

    /// Get a payment by reference.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotFound` for an unknown reference.
    pub async fn get(&self, reference: &str) -> Result<Payment, PaymentError> {
        self.payments
            .get_by_reference(reference)
            .await?
            .ok_or(PaymentError::NotFound)
    }

    /// Ask the provider for the final state of an open payment and settle it.
    /// Settled payments and payments without a provider reference are
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotFound` for an unknown reference.
    #[instrument(skip(self))]
    pub async fn verify(&self, reference: &str) -> Result<Payment, PaymentError> {
        let payment = self.get(reference).await?;
        if !is_open(payment.status) {
            return Ok(payment);
        }

        let (Some(client), Some(provider_reference)) =
            (self.campay, payment.provider_reference.as_deref())
        else {
            return Ok(payment);
        };

        let remote = match client.transaction_status(provider_reference).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(error = %e, reference, "Campay status check failed");
                return Ok(payment);
            }
        };

        match remote.status.settled() {
            Some(next) => {
                let response = serde_json::to_value(&remote).unwrap_or_default();
                self.settle(&payment, next, &response).await
            }
            None => Ok(payment),
        }
    }

    /// Apply a signature-checked Campay webhook. Repeated deliveries for a
    /// settled payment are acknowledged without changes.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotFound` if no payment matches the references.
    #[instrument(skip(self, payload), fields(reference = %payload.reference))]
    pub async fn apply_webhook(&self, payload: &WebhookPayload) -> Result<Payment, PaymentError> {
        let by_external = match payload.external_reference.as_deref() {
            Some(external) => self.payments.get_by_reference(external).await?,
            None => None,
        };
        let payment = match by_external {
            Some(payment) => payment,
            None => self
                .payments
                .get_by_provider_reference(&payload.reference)
                .await?
                .ok_or(PaymentError::NotFound)?,
        };

        let Some(next) = payload.status.settled() else {
            return Ok(payment);
        };
        if !is_open(payment.status) {
            tracing::info!(status = %payment.status.as_str(), "Webhook for settled payment ignored");
            return Ok(payment);
        }

        let response = serde_json::json!({ "webhook": payload });
        self.settle(&payment, next, &response).await
    }

    async fn settle(
        &self,
        payment: &Payment,
        next: PaymentStatus,
        response: &serde_json::Value,
    ) -> Result<Payment, PaymentError> {
        payment.status.transition(next)?;
        let settled = self
            .payments
            .settle(payment.id, payment.status, next, response)
            .await?;
        tracing::info!(reference = %settled.reference, status = %next.as_str(), "Payment settled");
        Ok(settled)
    }
}

const fn is_open(status: PaymentStatus) -> bool {
    matches!(status, PaymentStatus::Pending | PaymentStatus::Processing)
}

/// Provider label stored for payments that did not go through Campay.
const fn provider_name(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Campay | PaymentMethod::OrangeMoney | PaymentMethod::MtnMoney => "campay",
        PaymentMethod::Noupia => "noupia",
        PaymentMethod::Card => "card",
        PaymentMethod::CashOnDelivery => "cash",
        PaymentMethod::Wallet => "wallet",
        PaymentMethod::Installment => "installment",
    }
}

fn stub_response(method: PaymentMethod, error: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "stub": true,
        "method": method.as_str(),
        "message": "payment recorded, awaiting confirmation",
        "error": error,
    })
}

/// Generate a payment reference: `PAY_` + 8 upper-case alphanumerics.
#[must_use]
pub fn generate_reference() -> String {
    use rand::seq::IndexedRandom;
    let mut rng = rand::rng();
    let mut reference = String::with_capacity(REFERENCE_PREFIX.len() + REFERENCE_LENGTH);
    reference.push_str(REFERENCE_PREFIX);
    reference.extend(
        (0..REFERENCE_LENGTH)
            .filter_map(|_| REFERENCE_CHARSET.choose(&mut rng))
            .map(|&b| char::from(b)),
    );
    reference
}

/// Check the hex HMAC-SHA256 of a webhook body in constant time.
#[must_use]
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 signature of `body`, as Campay sends it.
#[must_use]
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        for _ in 0..50 {
            let reference = generate_reference();
            assert_eq!(reference.len(), 12);
            let suffix = reference.strip_prefix("PAY_").unwrap();
            assert!(
                suffix
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            );
        }
    }

    #[test]
    fn test_signature_round_trip() {
        let secret = b"Qm7#vT2!pL9@xR4$";
        let body = br#"{"reference":"CP-1","status":"SUCCESSFUL"}"#;
        let signature = sign(secret, body);
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(secret, body, &signature));
        assert!(verify_signature(secret, body, &signature.to_uppercase()));
        assert!(!verify_signature(b"another-secret", body, &signature));
        assert!(!verify_signature(secret, b"{}", &signature));
        assert!(!verify_signature(secret, body, "not-hex"));
    }

    #[test]
    fn test_webhook_payload_parsing() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"reference":"bcedde9b","external_reference":"PAY_AB12CD34","status":"SUCCESSFUL","operator":"MTN"}"#,
        )
        .unwrap();
        assert_eq!(payload.status, CampayStatus::Successful);
        assert_eq!(payload.status.settled(), Some(PaymentStatus::Completed));
        assert_eq!(payload.external_reference.as_deref(), Some("PAY_AB12CD34"));

        let pending: WebhookPayload =
            serde_json::from_str(r#"{"reference":"x","status":"PENDING"}"#).unwrap();
        assert_eq!(pending.status.settled(), None);
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(provider_name(PaymentMethod::OrangeMoney), "campay");
        assert_eq!(provider_name(PaymentMethod::CashOnDelivery), "cash");
        assert!(stub_response(PaymentMethod::Card, None)["stub"].as_bool().unwrap());
    }
}
