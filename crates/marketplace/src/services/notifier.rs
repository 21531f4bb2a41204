//! Notification fan-out: in-app rows, email copies and SMS codes.
//!
//! Nothing here returns an error to the caller. A failed insert or delivery
//! is logged and the request that triggered it carries on.

use sqlx::PgPool;

use vide_grenier_core::{NotificationKind, UserId};

use super::auth::CODE_TTL_MINUTES;
use super::email::EmailService;
use super::sms::SmsClient;
use crate::db::notifications::NotificationRepository;
use crate::db::users::UserRepository;
use crate::models::{Notification, User};

/// Delivers notifications over every configured channel.
#[derive(Clone)]
pub struct Notifier {
    pool: PgPool,
    email: Option<EmailService>,
    sms: Option<SmsClient>,
}

impl Notifier {
    #[must_use]
    pub const fn new(pool: PgPool, email: Option<EmailService>, sms: Option<SmsClient>) -> Self {
        Self { pool, email, sms }
    }

    /// Store an in-app notification and mirror it by email in the background.
    /// Chat messages are not mirrored; the recipient sees them live.
    pub async fn notify(
        &self,
        user: UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) -> Option<Notification> {
        let stored = match NotificationRepository::new(&self.pool)
            .create(user, kind, title, message, &data)
            .await
        {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user, kind = %kind.as_str(), "Failed to store notification");
                None
            }
        };

        if kind != NotificationKind::Message
            && let Some(email) = self.email.clone()
        {
            let pool = self.pool.clone();
            let title = title.to_owned();
            let message = message.to_owned();
            tokio::spawn(async move {
                let recipient = match UserRepository::new(&pool).get_by_id(user).await {
                    Ok(Some(u)) => u.email,
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(error = %e, user_id = %user, "Failed to load notification recipient");
                        return;
                    }
                };
                if let Err(e) = email
                    .send_notification(recipient.as_str(), &title, &message)
                    .await
                {
                    tracing::warn!(error = %e, user_id = %user, "Notification email failed");
                }
            });
        }

        stored
    }

    /// Send a verification code by SMS, falling back to email.
    pub async fn send_code(&self, user: &User, code: &str) {
        if let Some(sms) = &self.sms {
            let text = format!(
                "Vide-Grenier Kamer: votre code est {code}. Il expire dans {CODE_TTL_MINUTES} minutes."
            );
            match sms.send(&user.phone, &text).await {
                Ok(()) => return,
                Err(e) => tracing::warn!(error = %e, user_id = %user.id, "SMS failed, falling back to email"),
            }
        }

        let Some(email) = &self.email else {
            tracing::warn!(user_id = %user.id, "No channel configured to deliver verification code");
            return;
        };
        if let Err(e) = email
            .send_verification_code(user.email.as_str(), code, CODE_TTL_MINUTES)
            .await
        {
            tracing::warn!(error = %e, user_id = %user.id, "Verification code email failed");
        }
    }

    /// Send the welcome email in the background.
    pub fn welcome(&self, user: &User) {
        let Some(email) = self.email.clone() else {
            return;
        };
        let to = user.email.as_str().to_owned();
        let name = user.first_name.clone();
        tokio::spawn(async move {
            if let Err(e) = email.send_welcome_email(&to, &name).await {
                tracing::warn!(error = %e, "Welcome email failed");
            }
        });
    }

    /// The email service, when SMTP is configured.
    #[must_use]
    pub const fn email(&self) -> Option<&EmailService> {
        self.email.as_ref()
    }
}
