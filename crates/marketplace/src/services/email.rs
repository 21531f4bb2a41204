//! Email service for verification codes, notifications and newsletters.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// HTML template for verification code email.
#[derive(Template)]
#[template(path = "email/verification_code.html")]
struct VerificationCodeEmailHtml<'a> {
    code: &'a str,
    minutes: i64,
}

/// Plain text template for verification code email.
#[derive(Template)]
#[template(path = "email/verification_code.txt")]
struct VerificationCodeEmailText<'a> {
    code: &'a str,
    minutes: i64,
}

/// HTML template for welcome email.
#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmailHtml<'a> {
    name: &'a str,
    site_url: &'a str,
}

/// Plain text template for welcome email.
#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeEmailText<'a> {
    name: &'a str,
    site_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/notification.html")]
struct NotificationEmailHtml<'a> {
    title: &'a str,
    message: &'a str,
    site_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/notification.txt")]
struct NotificationEmailText<'a> {
    title: &'a str,
    message: &'a str,
    site_url: &'a str,
}

/// Campaign wrapper. `content` is admin-authored HTML and is inserted unescaped.
#[derive(Template)]
#[template(path = "email/newsletter.html")]
struct NewsletterEmailHtml<'a> {
    subject: &'a str,
    content: &'a str,
    unsubscribe_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/newsletter.txt")]
struct NewsletterEmailText<'a> {
    subject: &'a str,
    content: &'a str,
    unsubscribe_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    site_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig, site_url: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            site_url: site_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send a verification code (phone confirmation fallback or 2FA).
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        minutes: i64,
    ) -> Result<(), EmailError> {
        let html = VerificationCodeEmailHtml { code, minutes }.render()?;
        let text = VerificationCodeEmailText { code, minutes }.render()?;

        self.send_multipart_email(
            to,
            "Votre code de vérification Vide-Grenier Kamer",
            &text,
            &html,
        )
        .await
    }

    /// Send a welcome email after registration.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_welcome_email(&self, to: &str, name: &str) -> Result<(), EmailError> {
        let site_url = self.site_url.as_str();
        let html = WelcomeEmailHtml { name, site_url }.render()?;
        let text = WelcomeEmailText { name, site_url }.render()?;

        self.send_multipart_email(to, "Bienvenue sur Vide-Grenier Kamer", &text, &html)
            .await
    }

    /// Mirror an in-app notification by email.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_notification(
        &self,
        to: &str,
        title: &str,
        message: &str,
    ) -> Result<(), EmailError> {
        let site_url = self.site_url.as_str();
        let html = NotificationEmailHtml {
            title,
            message,
            site_url,
        }
        .render()?;
        let text = NotificationEmailText {
            title,
            message,
            site_url,
        }
        .render()?;

        self.send_multipart_email(to, title, &text, &html).await
    }

    /// Send one newsletter campaign to one subscriber.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_newsletter(
        &self,
        to: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), EmailError> {
        let encoded: String = url::form_urlencoded::byte_serialize(to.as_bytes()).collect();
        let unsubscribe_url = format!(
            "{}/api/v1/newsletter/unsubscribe?email={encoded}",
            self.site_url
        );
        let html = NewsletterEmailHtml {
            subject,
            content,
            unsubscribe_url: &unsubscribe_url,
        }
        .render()?;
        let text = NewsletterEmailText {
            subject,
            content: &strip_tags(content),
            unsubscribe_url: &unsubscribe_url,
        }
        .render()?;

        self.send_multipart_email(to, subject, &text, &html).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Crude HTML-to-text for the plain part of a campaign.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                if !out.ends_with(char::is_whitespace) {
                    out.push(' ');
                }
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        assert_eq!(
            strip_tags("<h1>Soldes</h1><p>Jusqu'à <b>-50%</b> ce week-end</p>"),
            "Soldes Jusqu'à -50% ce week-end"
        );
        assert_eq!(strip_tags("texte brut"), "texte brut");
    }

    #[test]
    fn test_verification_template_renders_code() {
        let text = VerificationCodeEmailText {
            code: "482913",
            minutes: 10,
        }
        .render()
        .unwrap();
        assert!(text.contains("482913"));
        assert!(text.contains("10 minutes"));
    }

    #[test]
    fn test_notification_html_escapes_message() {
        let html = NotificationEmailHtml {
            title: "Nouvelle commande",
            message: "<script>alert(1)</script>",
            site_url: "https://videgrenierkamer.cm",
        }
        .render()
        .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("Nouvelle commande"));
    }

    #[test]
    fn test_newsletter_html_keeps_campaign_markup() {
        let html = NewsletterEmailHtml {
            subject: "Promo",
            content: "<p>Bonjour</p>",
            unsubscribe_url: "https://videgrenierkamer.cm/api/v1/newsletter/unsubscribe",
        }
        .render()
        .unwrap();
        assert!(html.contains("<p>Bonjour</p>"));
        assert!(html.contains("unsubscribe"));
    }
}
