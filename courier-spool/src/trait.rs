use async_trait::async_trait;
use courier_common::EmailTask;

/// Durable home of the dispatch queue.
///
/// Implementations hold exactly one snapshot at a time. Callers are
/// responsible for serialising snapshots against each other; a store only
/// guarantees that a single `snapshot` is all-or-nothing.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// Replace the stored sequence with `tasks`
    ///
    /// # Errors
    /// If the tasks cannot be encoded or the backing storage cannot be written
    async fn snapshot(&self, tasks: &[EmailTask]) -> crate::Result<()>;

    /// Read back the last snapshot, or an empty sequence if there is none
    ///
    /// # Errors
    /// If the backing storage cannot be read, or holds something that is not
    /// a snapshot
    async fn restore(&self) -> crate::Result<Vec<EmailTask>>;
}
