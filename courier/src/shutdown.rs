use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use courier_common::{Signal, internal};
use courier_delivery::Journal;
use tokio::sync::broadcast;

/// Turns a termination signal into a final snapshot of the queue
///
/// When triggered it tells every subscriber to stop taking new work, then
/// saves the queue, in-flight tasks included, through the same
/// [`Journal`] the workers use. It does not wait for deliveries in flight.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    journal: Arc<Journal>,
    broadcast: broadcast::Sender<Signal>,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(journal: Arc<Journal>) -> Self {
        let (broadcast, _receiver) = broadcast::channel(16);
        Self {
            journal,
            broadcast,
            triggered: AtomicBool::new(false),
        }
    }

    /// A receiver that sees [`Signal::Shutdown`] once this coordinator fires
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.broadcast.subscribe()
    }

    /// Whether a shutdown has been triggered
    #[must_use]
    pub fn triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Resolves on Ctrl-C (SIGINT) or SIGTERM
    ///
    /// # Errors
    /// If the signal handlers cannot be installed
    #[tracing::instrument(level = tracing::Level::TRACE)]
    pub async fn wait_for_signal() -> anyhow::Result<()> {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r?;
                internal!(level = INFO, "CTRL+C entered, saving queue");
            }
            _ = terminate.recv() => {
                internal!(level = INFO, "Terminate Signal received, saving queue");
            }
        };

        Ok(())
    }

    /// Wait for `trigger`, then broadcast shutdown and save the queue
    ///
    /// Returns the number of tasks saved.
    ///
    /// # Errors
    /// If `trigger` fails or the queue cannot be saved
    pub async fn watch_with(
        &self,
        trigger: impl Future<Output = anyhow::Result<()>>,
    ) -> anyhow::Result<usize> {
        trigger.await?;

        self.triggered.store(true, Ordering::Release);
        // No receivers left only means nothing is running
        let _ = self.broadcast.send(Signal::Shutdown);

        self.save_on_exit().await
    }

    /// Save the queue one last time
    ///
    /// # Errors
    /// If the queue cannot be saved
    pub async fn save_on_exit(&self) -> anyhow::Result<usize> {
        let saved = self.journal.persist().await?;
        internal!(level = INFO, "Queue saved on exit ({saved} pending)");
        Ok(saved)
    }
}
