//! Error types for the courier-spool crate.
//!
//! Snapshot and restore failures are split into I/O problems (the file could
//! not be reached) and serialization problems (the file was reached but its
//! contents are unusable). Both are fatal to the operation that hit them.

use std::io;

use thiserror::Error;

/// Top-level spool error type.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// The backing file could not be read, written or renamed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot could not be encoded, or the file on disk could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// The configured store location is unusable.
    #[error("Spool validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpoolError {
    /// Returns `true` if a snapshot exists but cannot be trusted.
    ///
    /// Startup must stop here rather than run with a guessed queue.
    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        matches!(
            self,
            Self::Serialization(SerializationError::Decode(_) | SerializationError::Corrupt(_))
        )
    }
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The file is not a queue snapshot, or is truncated.
    #[error("Corrupted snapshot: {0}")]
    Corrupt(String),
}

/// Store location validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No file name was given.
    #[error("Queue file path is empty")]
    EmptyPath,

    /// The path climbs out of its directory.
    #[error("Queue file path cannot contain '..' components: {0}")]
    ParentTraversal(String),

    /// The path points into a system directory.
    #[error("Queue file cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: String, path: String },

    /// The path exists but is a directory.
    #[error("Queue file path is a directory: {0}")]
    IsDirectory(String),
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

impl<T> From<std::sync::PoisonError<T>> for SpoolError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
