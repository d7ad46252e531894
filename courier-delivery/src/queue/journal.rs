use std::sync::Arc;

use courier_common::internal;
use courier_spool::{QueueStore, SpoolError};
use tokio::sync::Mutex;

use super::DispatchQueue;

/// Mirrors the dispatch queue into its durable store
///
/// Every writer, whether a worker, a producer or the shutdown path, goes
/// through [`persist`](Self::persist), which holds one async lock across
/// "read the queue, write the snapshot". Two snapshots therefore never
/// interleave, and the last one written reflects the latest queue state.
#[derive(Debug)]
pub struct Journal {
    queue: Arc<DispatchQueue>,
    store: Arc<dyn QueueStore>,
    write_lock: Mutex<()>,
}

impl Journal {
    #[must_use]
    pub fn new(queue: Arc<DispatchQueue>, store: Arc<dyn QueueStore>) -> Self {
        Self {
            queue,
            store,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// Snapshot every undelivered task, in-flight ones included
    ///
    /// Returns the number of tasks written.
    ///
    /// # Errors
    /// If the store cannot be written
    pub async fn persist(&self) -> Result<usize, SpoolError> {
        let _guard = self.write_lock.lock().await;

        let tasks = self.queue.durable_contents();
        self.store.snapshot(&tasks).await?;

        internal!(level = DEBUG, "Queue saved with {} tasks", tasks.len());

        Ok(tasks.len())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use courier_common::EmailTask;
    use courier_spool::MemoryQueueStore;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn persist_includes_leased_tasks() {
        let store = MemoryQueueStore::new();
        let queue = Arc::new(DispatchQueue::from_tasks(vec![
            EmailTask::new("a", "body", "a@example.com"),
            EmailTask::new("b", "body", "b@example.com"),
        ]));
        let journal = Journal::new(Arc::clone(&queue), Arc::new(store.clone()));

        let lease = queue.try_dequeue().expect("queue should not be empty");
        assert_eq!(journal.persist().await.expect("Failed to persist"), 2);

        lease.complete();
        assert_eq!(journal.persist().await.expect("Failed to persist"), 1);
        assert_eq!(
            store.tasks(),
            vec![EmailTask::new("b", "body", "b@example.com")]
        );
    }

    #[tokio::test]
    async fn persist_surfaces_store_errors() {
        let store = MemoryQueueStore::new();
        store.fail_snapshots(true);
        let journal = Journal::new(Arc::new(DispatchQueue::new()), Arc::new(store));

        assert!(matches!(journal.persist().await, Err(SpoolError::Io(_))));
    }
}
