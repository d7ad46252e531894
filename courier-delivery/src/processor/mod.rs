//! Worker pool that drains the dispatch queue

mod worker;

use std::{ops::AddAssign, sync::Arc, time::Duration};

use courier_common::{
    Signal, internal,
    tracing::{info, warn},
};
use serde::Deserialize;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinSet,
};

use crate::{
    error::DeliveryError,
    policy::RetryPolicy,
    queue::{DispatchQueue, Journal},
    transport::{MailTransport, OutboundMessage},
};
use worker::Worker;

/// When workers stop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum DispatchMode {
    /// Stop once the queue is empty and no task is in flight
    #[default]
    Drain,
    /// Keep waiting for new tasks until shutdown is signalled
    Serve,
}

/// Worker pool and retry settings
///
/// ```ron
/// delivery: (
///     retry_limit: 3,
///     worker_count: 5,
///     backoff_secs: 5,
///     jitter_factor: 0.0,
///     mode: Drain,
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeliveryConfig {
    /// Retries allowed after the first attempt
    ///
    /// Default: 3
    #[serde(default = "defaults::retry_limit")]
    pub retry_limit: u32,

    /// Number of concurrent workers
    ///
    /// Default: 5
    #[serde(default = "defaults::worker_count")]
    pub worker_count: usize,

    /// Pause a worker takes after a failed attempt (in seconds)
    ///
    /// Default: 5
    #[serde(default = "defaults::backoff_secs")]
    pub backoff_secs: u64,

    /// Randomises the pause within ±`jitter_factor`
    ///
    /// Default: 0.0 (fixed pause)
    #[serde(default)]
    pub jitter_factor: f64,

    #[serde(default)]
    pub mode: DispatchMode,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_limit: defaults::retry_limit(),
            worker_count: defaults::worker_count(),
            backoff_secs: defaults::backoff_secs(),
            jitter_factor: 0.0,
            mode: DispatchMode::default(),
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_limit: self.retry_limit,
            backoff: Duration::from_secs(self.backoff_secs),
            jitter_factor: self.jitter_factor,
        }
    }
}

mod defaults {
    pub const fn retry_limit() -> u32 {
        3
    }

    pub const fn worker_count() -> usize {
        5
    }

    pub const fn backoff_secs() -> u64 {
        5
    }
}

/// A successful delivery, for whoever wants to show it to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl From<OutboundMessage> for DeliveryReceipt {
    fn from(message: OutboundMessage) -> Self {
        Self {
            recipient: message.recipient,
            subject: message.subject,
            body: message.body,
        }
    }
}

/// What a dispatch run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub retried: usize,
    pub exhausted: usize,
}

impl AddAssign for DrainReport {
    fn add_assign(&mut self, rhs: Self) {
        self.delivered += rhs.delivered;
        self.retried += rhs.retried;
        self.exhausted += rhs.exhausted;
    }
}

/// Fixed set of concurrent workers sharing one queue and one journal
#[derive(Debug)]
pub struct WorkerPool {
    journal: Arc<Journal>,
    transport: Arc<dyn MailTransport>,
    policy: RetryPolicy,
    worker_count: usize,
    mode: DispatchMode,
    receipts: Option<mpsc::UnboundedSender<DeliveryReceipt>>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(
        journal: Arc<Journal>,
        transport: Arc<dyn MailTransport>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            journal,
            transport,
            policy: config.retry_policy(),
            worker_count: config.worker_count,
            mode: config.mode,
            receipts: None,
        }
    }

    /// Send a [`DeliveryReceipt`] here for every delivered task
    #[must_use]
    pub fn with_receipts(mut self, receipts: mpsc::UnboundedSender<DeliveryReceipt>) -> Self {
        self.receipts = Some(receipts);
        self
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<DispatchQueue> {
        self.journal.queue()
    }

    /// Run every worker to completion
    ///
    /// Transport failures are handled per task and never end the run. The
    /// first store failure aborts all workers; tasks they held go back to
    /// the queue.
    ///
    /// # Errors
    /// If the queue cannot be saved, or a worker dies
    pub async fn run(
        self,
        shutdown: broadcast::Receiver<Signal>,
    ) -> Result<DrainReport, DeliveryError> {
        let worker_count = if self.worker_count == 0 {
            warn!("worker_count is 0, running a single worker");
            1
        } else {
            self.worker_count
        };

        internal!(
            level = INFO,
            "Starting {worker_count} workers in {:?} mode with {} tasks queued",
            self.mode,
            self.queue().len()
        );

        let mut workers: JoinSet<Result<DrainReport, DeliveryError>> = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                journal: Arc::clone(&self.journal),
                transport: Arc::clone(&self.transport),
                policy: self.policy,
                mode: self.mode,
                receipts: self.receipts.clone(),
                shutdown: shutdown.resubscribe(),
            };

            workers.spawn(worker.run());
        }
        drop(shutdown);

        let mut report = DrainReport::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(worker_report)) => report += worker_report,
                Ok(Err(err)) => {
                    workers.abort_all();
                    return Err(err);
                }
                Err(err) => {
                    workers.abort_all();
                    return Err(err.into());
                }
            }
        }

        info!(
            delivered = report.delivered,
            retried = report.retried,
            exhausted = report.exhausted,
            remaining = self.queue().len(),
            "Dispatch finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn delivery_config_defaults() {
        let config: DeliveryConfig = ron::from_str("()").unwrap();

        assert_eq!(config, DeliveryConfig::default());
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.backoff_secs, 5);
        assert_eq!(config.mode, DispatchMode::Drain);
    }

    #[test]
    fn delivery_config_overrides() {
        let config: DeliveryConfig = ron::from_str(
            "(retry_limit: 1, worker_count: 2, backoff_secs: 0, jitter_factor: 0.5, mode: Serve)",
        )
        .unwrap();

        let policy = config.retry_policy();
        assert_eq!(policy.retry_limit, 1);
        assert_eq!(policy.backoff, Duration::ZERO);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.mode, DispatchMode::Serve);
    }

    #[test]
    fn reports_add_up() {
        let mut total = DrainReport {
            delivered: 1,
            retried: 2,
            exhausted: 0,
        };
        total += DrainReport {
            delivered: 3,
            retried: 0,
            exhausted: 1,
        };

        assert_eq!(
            total,
            DrainReport {
                delivered: 4,
                retried: 2,
                exhausted: 1
            }
        );
    }
}
