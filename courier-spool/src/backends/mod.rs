//! Backend storage implementations for the queue snapshot
//!
//! - `file`: single-file snapshot with atomic replacement
//! - `memory`: in-memory snapshot for tests and dry runs

pub mod file;
pub mod memory;

pub use file::{FileQueueStore, FileQueueStoreBuilder};
pub use memory::MemoryQueueStore;
