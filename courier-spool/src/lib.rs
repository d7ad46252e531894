//! Durable storage for the dispatch queue.
//!
//! The queue is persisted as a single snapshot: every write replaces the
//! whole sequence of pending tasks, and the snapshot is read back once at
//! startup.

pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;

pub use backends::{FileQueueStore, MemoryQueueStore};
pub use config::StoreConfig;
pub use error::{Result, SerializationError, SpoolError, ValidationError};
pub use r#trait::QueueStore;
