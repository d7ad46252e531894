use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A queued unit of outbound mail work.
///
/// The payload is fixed when the task is created; only the retry counter
/// changes over the lifetime of the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTask {
    subject: String,
    body: String,
    recipient: String,
    retry_count: u32,
}

impl EmailTask {
    /// Create a fresh task that has not been attempted yet
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            recipient: recipient.into(),
            retry_count: 0,
        }
    }

    /// Rebuild a task with an existing retry count, e.g. from a snapshot
    #[must_use]
    pub const fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Count one more failed attempt, returning the new retry count
    pub const fn record_failure(&mut self) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }
}

impl Display for EmailTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} to {} (retries: {})",
            self.subject, self.recipient, self.retry_count
        )
    }
}
