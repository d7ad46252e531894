use std::sync::Arc;

use courier_common::{
    Signal,
    tracing::{error, info, trace, warn},
};
use tokio::sync::{
    broadcast::{self, error::RecvError, error::TryRecvError},
    mpsc,
};

use super::{DeliveryReceipt, DispatchMode, DrainReport};
use crate::{
    error::DeliveryError,
    policy::RetryPolicy,
    queue::{Journal, Lease},
    transport::{MailTransport, OutboundMessage},
};

enum Outcome {
    Delivered,
    Retried,
    Exhausted,
}

pub(super) struct Worker {
    pub(super) id: usize,
    pub(super) journal: Arc<Journal>,
    pub(super) transport: Arc<dyn MailTransport>,
    pub(super) policy: RetryPolicy,
    pub(super) mode: DispatchMode,
    pub(super) receipts: Option<mpsc::UnboundedSender<DeliveryReceipt>>,
    pub(super) shutdown: broadcast::Receiver<Signal>,
}

/// Resolves when shutdown is signalled. A closed channel means no signal
/// can ever arrive, so it never resolves.
async fn shutdown_signalled(shutdown: &mut broadcast::Receiver<Signal>) {
    loop {
        match shutdown.recv().await {
            Ok(Signal::Shutdown) | Err(RecvError::Lagged(_)) => return,
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

impl Worker {
    fn stop_requested(&mut self) -> bool {
        matches!(
            self.shutdown.try_recv(),
            Ok(Signal::Shutdown) | Err(TryRecvError::Lagged(_))
        )
    }

    pub(super) async fn run(mut self) -> Result<DrainReport, DeliveryError> {
        let queue = Arc::clone(self.journal.queue());
        let mut report = DrainReport::default();

        trace!(worker = self.id, "Worker started");

        loop {
            if self.stop_requested() {
                trace!(worker = self.id, "Worker stopping on shutdown");
                break;
            }

            let Some(lease) = queue.try_dequeue() else {
                if self.mode == DispatchMode::Drain && queue.is_drained() {
                    break;
                }

                let stopped = match self.mode {
                    DispatchMode::Drain => tokio::select! {
                        () = queue.wait_for_task_or_drained() => false,
                        () = shutdown_signalled(&mut self.shutdown) => true,
                    },
                    DispatchMode::Serve => tokio::select! {
                        () = queue.wait_for_task() => false,
                        () = shutdown_signalled(&mut self.shutdown) => true,
                    },
                };

                if stopped {
                    break;
                }
                continue;
            };

            match self.attempt(lease).await? {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Exhausted => report.exhausted += 1,
                Outcome::Retried => {
                    report.retried += 1;

                    let delay = self.policy.backoff_delay();
                    let stopped = tokio::select! {
                        () = tokio::time::sleep(delay) => false,
                        () = shutdown_signalled(&mut self.shutdown) => true,
                    };

                    if stopped {
                        break;
                    }
                }
            }
        }

        trace!(worker = self.id, "Worker finished");
        Ok(report)
    }

    /// One delivery attempt, settling the lease and saving the queue after it
    async fn attempt(&self, lease: Lease) -> Result<Outcome, DeliveryError> {
        let message = OutboundMessage::from(lease.task());
        let retry_count = lease.task().retry_count();

        let outcome = match self.transport.deliver(&message).await {
            Ok(()) => {
                info!(
                    worker = self.id,
                    recipient = %message.recipient,
                    subject = %message.subject,
                    "Email sent to {}",
                    message.recipient
                );

                lease.complete();
                if let Some(receipts) = &self.receipts {
                    // A receiver that has gone away only loses the receipt
                    let _ = receipts.send(DeliveryReceipt::from(message));
                }

                Outcome::Delivered
            }
            Err(err) if self.policy.should_retry(retry_count) => {
                let retry_count = lease.retry();
                warn!(
                    worker = self.id,
                    recipient = %message.recipient,
                    retry_count,
                    retry_limit = self.policy.retry_limit,
                    remaining = self.policy.remaining_retries(retry_count),
                    error = %err,
                    "Retrying email to {} ({retry_count} of {})",
                    message.recipient,
                    self.policy.retry_limit
                );

                Outcome::Retried
            }
            Err(err) => {
                lease.discard();
                error!(
                    worker = self.id,
                    recipient = %message.recipient,
                    retry_count,
                    error = %err,
                    "Giving up on email to {} after {retry_count} retries",
                    message.recipient
                );

                Outcome::Exhausted
            }
        };

        self.journal.persist().await?;
        Ok(outcome)
    }
}
