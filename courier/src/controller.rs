use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use courier_common::{EmailTask, internal, logging::LoggingConfig};
use courier_delivery::{
    DeliveryConfig, DeliveryReceipt, Dispatcher, DrainReport, MailTransport,
};
use courier_spool::StoreConfig;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::shutdown::ShutdownCoordinator;

/// Top-level configuration
///
/// ```ron
/// Courier (
///     store: File(path: "email_queue.bin"),
///     delivery: (retry_limit: 3, worker_count: 5),
///     logging: (file: Some("email_queue.log")),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(alias = "queue", default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(alias = "log", default)]
    pub logging: LoggingConfig,
}

/// How a dispatch run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The pool stopped on its own
    Finished(DrainReport),
    /// A termination signal arrived; this many tasks were saved for next time
    Interrupted { saved: usize },
}

/// Find the configuration file using the following precedence:
/// 1. `explicit`, normally from the command line
/// 2. `COURIER_CONFIG` environment variable
/// 3. ./courier.config.ron (current working directory)
/// 4. /etc/courier/courier.config.ron (system-wide config)
///
/// Returns `None` when nothing was asked for and no default file exists.
///
/// # Errors
/// If an explicitly requested file does not exist
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    if let Ok(env_path) = std::env::var("COURIER_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "COURIER_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./courier.config.ron"),
        PathBuf::from("/etc/courier/courier.config.ron"),
    ];

    Ok(default_paths.into_iter().find(|path| path.exists()))
}

impl Courier {
    /// Load the configuration, falling back to defaults when there is no file
    ///
    /// # Errors
    /// If a requested file is missing, unreadable, or not valid RON
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let Some(config_path) = find_config_file(explicit)? else {
            return Ok(Self::default());
        };

        let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read config from {}: {}",
                config_path.display(),
                e
            )
        })?;

        Self::parse(&config_content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", config_path.display()))
    }

    /// Parse a RON configuration
    ///
    /// # Errors
    /// If `content` is not a valid configuration
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Build the configured store and restore the queue from it
    ///
    /// # Errors
    /// If the store cannot be prepared, or its snapshot is unreadable or corrupt
    pub async fn open(&self) -> anyhow::Result<Dispatcher> {
        let store = self.store.clone().into_store()?;
        Ok(Dispatcher::open(store, self.delivery.clone()).await?)
    }

    /// Every task waiting in the store
    ///
    /// # Errors
    /// See [`Courier::open`]
    pub async fn pending(&self) -> anyhow::Result<Vec<EmailTask>> {
        Ok(self.open().await?.queue().contents())
    }
}

/// Run the worker pool until it finishes, or until `trigger` fires
///
/// On `trigger` the coordinator stops the workers and saves the queue,
/// in-flight tasks included, without waiting for deliveries to finish.
///
/// # Errors
/// If the queue cannot be saved, or `trigger` itself fails
pub async fn run_dispatch(
    dispatcher: &Dispatcher,
    transport: Arc<dyn MailTransport>,
    trigger: impl Future<Output = anyhow::Result<()>>,
    receipts: Option<mpsc::UnboundedSender<DeliveryReceipt>>,
) -> anyhow::Result<DispatchOutcome> {
    let coordinator = ShutdownCoordinator::new(Arc::clone(dispatcher.journal()));

    internal!("Dispatch running");

    let outcome = tokio::select! {
        saved = coordinator.watch_with(trigger) => {
            DispatchOutcome::Interrupted { saved: saved? }
        }
        report = dispatcher.run_dispatch(transport, coordinator.subscribe(), receipts) => {
            let report = report?;
            if coordinator.triggered() {
                // The pool wound down before the coordinator finished saving
                DispatchOutcome::Interrupted { saved: coordinator.save_on_exit().await? }
            } else {
                DispatchOutcome::Finished(report)
            }
        }
    };

    internal!("Dispatch stopped: {outcome:?}");

    Ok(outcome)
}
