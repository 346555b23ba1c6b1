//! Best-effort notification channel.
//!
//! Callers treat notifications as advisory: a failed send is logged by the
//! caller and never changes the outcome of the operation that triggered it.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("invalid address {0}: {1}")]
    InvalidAddress(String, String),
    #[error("could not build message: {0}")]
    Message(String),
    #[error("smtp error: {0}")]
    Smtp(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), NotifyError>;
}

/// Used when no notification channel is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, subject: &str, _message: &str) -> Result<(), NotifyError> {
        tracing::debug!(subject, "No notification channel configured, dropping notification");
        Ok(())
    }
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SmtpConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub from: String,
    pub to: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Sends plain-text mail over SMTP with STARTTLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from)?;
        let to = parse_mailbox(&config.to)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(SmtpNotifier {
            transport: builder.build(),
            from,
            to,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| {
            NotifyError::InvalidAddress(address.to_string(), e.to_string())
        })
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .map_err(|e| NotifyError::Message(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(subject, "Notification sent");
        Ok(())
    }
}
