//! The seam between the worker pool and whatever actually sends mail

pub mod smtp;

use async_trait::async_trait;
use courier_common::EmailTask;
use thiserror::Error;

/// A message ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl From<&EmailTask> for OutboundMessage {
    fn from(task: &EmailTask) -> Self {
        Self {
            recipient: task.recipient().to_string(),
            subject: task.subject().to_string(),
            body: task.body().to_string(),
        }
    }
}

/// Capability that performs the actual network delivery
///
/// Implementations own their connection handling and timeouts. Any error is
/// treated as a failed attempt and fed to the retry policy.
#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Attempt to deliver one message
    ///
    /// # Errors
    /// If the message could not be handed to the mail server
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

/// Why a transport could not deliver
#[derive(Debug, Error)]
pub enum TransportError {
    /// Missing or malformed transport settings.
    #[error("Transport configuration error: {0}")]
    Configuration(String),

    /// The sender or recipient could not be parsed as a mailbox.
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The message itself could not be built.
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    /// The SMTP session failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The transport is reachable but refused or dropped the message.
    #[error("Delivery failed: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn message_copies_task_payload() {
        let task = EmailTask::new("Subject", "Body text", "to@example.com").with_retry_count(2);

        assert_eq!(
            OutboundMessage::from(&task),
            OutboundMessage {
                recipient: "to@example.com".to_string(),
                subject: "Subject".to_string(),
                body: "Body text".to_string(),
            }
        );
    }
}
