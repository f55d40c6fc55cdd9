/// Outgoing account mail: verification and password reset links
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()>;
}

/// Renders account mail with links into the frontend
#[derive(Debug, Clone)]
pub struct MailTemplates {
    frontend_url: String,
}

impl MailTemplates {
    pub fn new(frontend_url: &str) -> Self {
        Self {
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn verification(&self, to: &str, token: &str) -> OutgoingMail {
        let link = format!("{}/verify/{}", self.frontend_url, token);
        OutgoingMail {
            to: to.to_string(),
            subject: "Verify your account".to_string(),
            body: format!(
                "Welcome!\n\nPlease open the following link to verify your email address:\n{}\n\nIf you did not create an account, please ignore this email.",
                link
            ),
        }
    }

    pub fn password_reset(&self, to: &str, token: &str) -> OutgoingMail {
        let link = format!("{}/reset-password/{}", self.frontend_url, token);
        OutgoingMail {
            to: to.to_string(),
            subject: "Reset your password".to_string(),
            body: format!(
                "We received a password reset request for your account.\n\nOpen the following link to choose a new password:\n{}\n\nThe link can be used once. If you did not request this, please ignore this email.",
                link
            ),
        }
    }
}

/// SMTP mailer; an empty host switches it to log-only mode
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let from = config
            .smtp_from
            .parse::<Mailbox>()
            .map_err(|e| anyhow::anyhow!("Invalid SMTP_FROM address: {}", e))?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("SMTP host not configured; mail will only be logged");
            None
        } else {
            let builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                .map_err(|e| anyhow::anyhow!("Failed to configure SMTP transport: {}", e))?
                .port(config.smtp_port);

            let builder = if let (Some(username), Some(password)) =
                (&config.smtp_username, &config.smtp_password)
            {
                builder.credentials(Credentials::new(username.to_string(), password.to_string()))
            } else {
                builder
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        let Some(transport) = &self.transport else {
            info!(subject = %mail.subject, "Mailer in log-only mode; skipping send");
            return Ok(());
        };

        let to = mail
            .to
            .parse::<Mailbox>()
            .map_err(|e| anyhow::anyhow!("Invalid recipient address: {}", e))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.as_str())
            .header(header::ContentType::TEXT_PLAIN)
            .body(mail.body)?;

        transport.send(message).await?;
        info!(subject = %mail.subject, "Email sent");
        Ok(())
    }
}
