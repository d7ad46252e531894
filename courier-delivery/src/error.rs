//! Typed error handling for dispatch operations.
//!
//! Producers see [`EnqueueError`]; a dispatch run reports [`DeliveryError`].
//! Transport failures on individual tasks never reach either of these: they
//! are absorbed by the retry policy.

use courier_spool::SpoolError;
use thiserror::Error;

use crate::transport::TransportError;

/// Why a task was not accepted onto the queue.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The recipient is not a syntactically valid address. Nothing was queued.
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// The task was queued but the queue could not be saved.
    #[error("Queue store error: {0}")]
    Store(#[from] SpoolError),
}

/// Why a dispatch run stopped early.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Saving the queue failed. The run is aborted rather than continue
    /// with state that only exists in memory.
    #[error("Queue store error: {0}")]
    Store(#[from] SpoolError),

    /// The transport could not be set up at all.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A worker died unexpectedly.
    #[error("System error: {0}")]
    System(String),
}

impl From<tokio::task::JoinError> for DeliveryError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::System(format!("worker terminated: {err}"))
    }
}
