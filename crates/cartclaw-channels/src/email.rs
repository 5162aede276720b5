//! SMTP email transport — async lettre sending over a STARTTLS relay.
//! Supports Gmail, Outlook, custom servers.

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, message::Mailbox, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use cartclaw_core::config::SmtpConfig;
use cartclaw_core::error::{ClawError, Result};
use cartclaw_core::traits::EmailTransport;

/// Email transport backed by an SMTP relay.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let from_name = self.config.display_name.as_deref().unwrap_or("CartClaw");
        let from_mailbox: Mailbox = format!("{from_name} <{}>", self.config.email)
            .parse()
            .map_err(|e| ClawError::Delivery(format!("Invalid from: {e}")))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| ClawError::Delivery(format!("Invalid to: {e}")))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| ClawError::Delivery(format!("Build email: {e}")))?;

        let creds = Credentials::new(self.config.email.clone(), self.config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| ClawError::Delivery(format!("SMTP relay: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| ClawError::Delivery(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}
