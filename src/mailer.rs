//! Outgoing mail. Delivery is a collaborator: the binary logs messages
//! instead of talking SMTP, and tests record them.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::data::{Token, User};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, email: &Email) -> Result<(), MailError>;
}

/// Welcome message carrying the activation token for a new account.
pub fn welcome_email(user: &User, activation: &Token) -> Email {
    let instructions = format!(
        "Please send a `PUT /v1/users/activated` request with the following JSON body \
         to activate your account:\n\n{{\"token\": \"{}\"}}\n\n\
         Please note that this is a one-time use token and it will expire at {}.",
        activation.plaintext,
        activation.expiry.to_rfc3339(),
    );

    Email {
        subject: "Welcome to Greenlight!".to_string(),
        plain_body: format!(
            "Hi {},\n\nThanks for signing up for a Greenlight account. \
             Your user ID number is {}.\n\n{}\n\nThanks,\n\nThe Greenlight Team",
            user.name, user.id, instructions
        ),
        html_body: format!(
            "<p>Hi {},</p><p>Thanks for signing up for a Greenlight account. \
             Your user ID number is {}.</p><pre>{}</pre><p>Thanks,</p><p>The Greenlight Team</p>",
            user.name, user.id, instructions
        ),
    }
}

/// Writes each message to the log instead of delivering it.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self { sender: sender.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, email: &Email) -> Result<(), MailError> {
        info!(
            target: "greenlight::mailer",
            from = %self.sender,
            to = %recipient,
            subject = %email.subject,
            "Email queued"
        );
        Ok(())
    }
}

/// Keeps every message in memory, optionally after a delay.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    delay: Duration,
    sent: Mutex<Vec<(String, Email)>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, Email)> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, recipient: &str, email: &Email) -> Result<(), MailError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError::Delivery("mailbox lock poisoned".to_string()))?;
        sent.push((recipient.to_string(), email.clone()));
        Ok(())
    }
}
