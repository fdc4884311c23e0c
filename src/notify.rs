//! Outbound email notifications.
//!
//! Sends are fire-and-forget: [`spawn_send`] detaches the delivery and only
//! logs a failure, so the HTTP response never waits on SMTP.

use std::sync::Arc;

use axum::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();
        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|_| MailError::InvalidAddress(email.to.clone()))?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)?;

        self.transport.send(message).await?;
        info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Used when no SMTP relay is configured: the message only goes to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, body = %email.body, "email (not sent, smtp disabled)");
        Ok(())
    }
}

pub fn spawn_send(mailer: Arc<dyn Mailer>, email: Email) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let to = email.to.clone();
        if let Err(e) = mailer.send(email).await {
            warn!(error = %e, %to, "email delivery failed");
        }
    })
}

pub fn class_feedback_email(to: &str, class_name: &str, feedback: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Feedback on your class \"{class_name}\""),
        body: format!(
            "An administrator left feedback on \"{class_name}\":\n\n{feedback}\n"
        ),
    }
}
