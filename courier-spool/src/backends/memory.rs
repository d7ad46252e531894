use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use courier_common::EmailTask;

use crate::{SpoolError, r#trait::QueueStore};

/// In-memory queue store
///
/// Holds the last snapshot behind an `RwLock`. Nothing survives the process,
/// so this is meant for tests and for dry runs where durability is not wanted.
///
/// Clones share the same snapshot, which lets a test hand one clone to the
/// dispatcher and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    tasks: Arc<RwLock<Vec<EmailTask>>>,
    snapshots: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryQueueStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a snapshot, as if left by a previous run
    #[must_use]
    pub fn with_tasks(tasks: Vec<EmailTask>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(tasks)),
            ..Self::default()
        }
    }

    /// The last snapshot written
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn tasks(&self) -> Vec<EmailTask> {
        self.tasks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of successful snapshots taken so far
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::Acquire)
    }

    /// Make every following `snapshot` fail, or stop doing so
    pub fn fail_snapshots(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn snapshot(&self, tasks: &[EmailTask]) -> crate::Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(SpoolError::Io(std::io::Error::other(
                "memory store is configured to fail",
            )));
        }

        *self.tasks.write()? = tasks.to_vec();
        self.snapshots.fetch_add(1, Ordering::AcqRel);

        Ok(())
    }

    async fn restore(&self) -> crate::Result<Vec<EmailTask>> {
        Ok(self.tasks.read()?.clone())
    }
}
