use std::sync::Arc;

use courier_common::{
    EmailTask, Signal, internal, is_valid,
    tracing::{info, warn},
};
use courier_spool::{QueueStore, SpoolError};
use tokio::sync::{broadcast, mpsc};

use crate::{
    error::{DeliveryError, EnqueueError},
    processor::{DeliveryConfig, DeliveryReceipt, DrainReport, WorkerPool},
    queue::{DispatchQueue, Journal},
    transport::MailTransport,
};

/// Producer-facing handle on a durable dispatch queue
///
/// Opening a dispatcher restores whatever the store holds from a previous
/// run. Every accepted task is saved before [`enqueue`](Self::enqueue)
/// returns.
#[derive(Debug)]
pub struct Dispatcher {
    journal: Arc<Journal>,
    config: DeliveryConfig,
}

impl Dispatcher {
    /// Restore the queue from `store`
    ///
    /// # Errors
    /// If the store cannot be read, or holds a corrupt snapshot
    pub async fn open(
        store: Arc<dyn QueueStore>,
        config: DeliveryConfig,
    ) -> Result<Self, SpoolError> {
        let restored = store.restore().await?;
        if !restored.is_empty() {
            internal!(
                level = INFO,
                "Restored {} queued emails from a previous run",
                restored.len()
            );
        }

        let queue = Arc::new(DispatchQueue::from_tasks(restored));
        Ok(Self {
            journal: Arc::new(Journal::new(queue, store)),
            config,
        })
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<DispatchQueue> {
        self.journal.queue()
    }

    #[must_use]
    pub const fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    #[must_use]
    pub const fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Validate and queue one email, then save the queue
    ///
    /// # Errors
    /// - [`EnqueueError::InvalidRecipient`] if `recipient` is not a valid
    ///   address; the queue is left untouched
    /// - [`EnqueueError::Store`] if the queue could not be saved
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self, subject, body))]
    pub async fn enqueue(
        &self,
        subject: impl Into<String>,
        body: impl Into<String>,
        recipient: &str,
    ) -> Result<(), EnqueueError> {
        if !is_valid(recipient) {
            warn!(recipient, "Invalid email address: {recipient}");
            return Err(EnqueueError::InvalidRecipient(recipient.to_string()));
        }

        let task = EmailTask::new(subject, body, recipient);
        info!(recipient, subject = task.subject(), "Email queued for {recipient}");

        self.queue().enqueue(task);
        self.journal.persist().await?;

        Ok(())
    }

    /// Build a worker pool over this queue
    #[must_use]
    pub fn worker_pool(&self, transport: Arc<dyn MailTransport>) -> WorkerPool {
        WorkerPool::new(Arc::clone(&self.journal), transport, &self.config)
    }

    /// Run the worker pool until it finishes or `shutdown` fires
    ///
    /// # Errors
    /// If the queue cannot be saved while dispatching
    pub async fn run_dispatch(
        &self,
        transport: Arc<dyn MailTransport>,
        shutdown: broadcast::Receiver<Signal>,
        receipts: Option<mpsc::UnboundedSender<DeliveryReceipt>>,
    ) -> Result<DrainReport, DeliveryError> {
        let pool = self.worker_pool(transport);
        let pool = match receipts {
            Some(receipts) => pool.with_receipts(receipts),
            None => pool,
        };

        pool.run(shutdown).await
    }
}
