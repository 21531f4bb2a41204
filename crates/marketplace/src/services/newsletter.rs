//! Newsletter subscriptions and campaign delivery.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use vide_grenier_core::{Email, EmailError as AddressError, NewsletterId, UserId};

use super::email::EmailService;
use crate::db::RepositoryError;
use crate::db::newsletter::NewsletterRepository;
use crate::models::{Newsletter, Subscriber};

/// Emails in flight at once while sending a campaign.
const SEND_CONCURRENCY: usize = 8;

/// Longest accepted subject line.
pub const MAX_SUBJECT_LENGTH: usize = 200;

#[derive(Debug, Error)]
pub enum NewsletterError {
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] AddressError),

    #[error("newsletter not found")]
    NotFound,

    #[error("newsletter was already sent")]
    AlreadySent,

    #[error("email delivery is not configured")]
    EmailDisabled,

    #[error("{0}")]
    Invalid(&'static str),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Newsletter service.
pub struct NewsletterService<'a> {
    repo: NewsletterRepository<'a>,
    email: Option<&'a EmailService>,
}

impl<'a> NewsletterService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, email: Option<&'a EmailService>) -> Self {
        Self {
            repo: NewsletterRepository::new(pool),
            email,
        }
    }

    /// Subscribe an address. Subscribing twice is harmless and reactivates
    /// an unsubscribed address.
    ///
    /// # Errors
    ///
    /// Returns `NewsletterError::InvalidEmail` for malformed addresses.
    pub async fn subscribe(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<Subscriber, NewsletterError> {
        let email = Email::parse(email)?;
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        Ok(self.repo.subscribe(&email, name).await?)
    }

    /// Unsubscribe an address. Unknown addresses are accepted silently.
    ///
    /// # Errors
    ///
    /// Returns `NewsletterError::InvalidEmail` for malformed addresses.
    pub async fn unsubscribe(&self, email: &str) -> Result<(), NewsletterError> {
        let email = Email::parse(email)?;
        Ok(self.repo.unsubscribe(&email).await?)
    }

    /// Subscribers, optionally only the active ones.
    ///
    /// # Errors
    ///
    /// Returns `NewsletterError::Repository` if the query fails.
    pub async fn subscribers(&self, active_only: bool) -> Result<Vec<Subscriber>, NewsletterError> {
        Ok(self.repo.subscribers(active_only).await?)
    }

    /// Every campaign.
    ///
    /// # Errors
    ///
    /// Returns `NewsletterError::Repository` if the query fails.
    pub async fn campaigns(&self) -> Result<Vec<Newsletter>, NewsletterError> {
        Ok(self.repo.list().await?)
    }

    /// Draft a campaign.
    ///
    /// # Errors
    ///
    /// Returns `NewsletterError::Invalid` for an empty subject or content.
    pub async fn create(
        &self,
        subject: &str,
        content: &str,
        author: UserId,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<Newsletter, NewsletterError> {
        let subject = validate_campaign(subject, content)?;
        Ok(self.repo.create(subject, content, author, scheduled_for).await?)
    }

    /// Send a campaign to every active subscriber. A campaign is sent at most
    /// once; individual delivery failures are logged and not counted.
    ///
    /// # Errors
    ///
    /// Returns `NewsletterError::AlreadySent` on a second send and
    /// `NewsletterError::EmailDisabled` without SMTP.
    #[instrument(skip(self))]
    pub async fn send(&self, id: NewsletterId) -> Result<Newsletter, NewsletterError> {
        let email = self.email.ok_or(NewsletterError::EmailDisabled)?;
        let campaign = self.repo.get(id).await?.ok_or(NewsletterError::NotFound)?;
        if campaign.is_sent || !self.repo.claim_for_sending(id).await? {
            return Err(NewsletterError::AlreadySent);
        }

        let subscribers = self.repo.subscribers(true).await?;
        let delivered = futures::stream::iter(subscribers)
            .map(|subscriber| {
                let subject = campaign.subject.as_str();
                let content = campaign.content.as_str();
                async move {
                    match email
                        .send_newsletter(subscriber.email.as_str(), subject, content)
                        .await
                    {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(error = %e, subscriber_id = %subscriber.id, "Newsletter delivery failed");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(SEND_CONCURRENCY)
            .filter(|ok| std::future::ready(*ok))
            .count()
            .await;

        let count = i32::try_from(delivered).unwrap_or(i32::MAX);
        tracing::info!(newsletter_id = %id, recipients = count, "Newsletter sent");
        Ok(self.repo.set_recipients(id, count).await?)
    }

    /// Send every unsent campaign that is due.
    ///
    /// # Errors
    ///
    /// Returns `NewsletterError::EmailDisabled` without SMTP. Failures of a
    /// single campaign are logged and skipped.
    pub async fn send_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Newsletter>, NewsletterError> {
        if self.email.is_none() {
            return Err(NewsletterError::EmailDisabled);
        }
        let mut sent = Vec::new();
        for campaign in self.repo.pending(now).await? {
            match self.send(campaign.id).await {
                Ok(done) => sent.push(done),
                Err(NewsletterError::AlreadySent) => {}
                Err(e) => tracing::warn!(newsletter_id = %campaign.id, error = %e, "Scheduled newsletter failed"),
            }
        }
        Ok(sent)
    }
}

/// Trimmed subject of a campaign that has something to send.
fn validate_campaign<'s>(subject: &'s str, content: &str) -> Result<&'s str, NewsletterError> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(NewsletterError::Invalid("subject is required"));
    }
    if subject.chars().count() > MAX_SUBJECT_LENGTH {
        return Err(NewsletterError::Invalid("subject is too long"));
    }
    if content.trim().is_empty() {
        return Err(NewsletterError::Invalid("content is required"));
    }
    Ok(subject)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_is_trimmed() {
        let subject = validate_campaign("  Soldes de la rentrée ", "<p>Bonjour</p>").unwrap();
        assert_eq!(subject, "Soldes de la rentrée");
    }

    #[test]
    fn test_blank_campaigns_are_rejected() {
        assert!(matches!(
            validate_campaign("   ", "<p>Bonjour</p>"),
            Err(NewsletterError::Invalid("subject is required"))
        ));
        assert!(matches!(
            validate_campaign("Promo", " \n "),
            Err(NewsletterError::Invalid("content is required"))
        ));
    }

    #[test]
    fn test_subject_length_counts_characters() {
        let accented = "é".repeat(MAX_SUBJECT_LENGTH);
        assert!(validate_campaign(&accented, "x").is_ok());
        let long = "é".repeat(MAX_SUBJECT_LENGTH + 1);
        assert!(validate_campaign(&long, "x").is_err());
    }
}
