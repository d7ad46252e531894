use std::sync::Arc;

use courier_common::EmailTask;

use super::DispatchQueue;

/// Exclusive hold on one task while a worker attempts it
///
/// A lease is settled exactly once, by [`complete`](Self::complete),
/// [`retry`](Self::retry) or [`discard`](Self::discard). A lease dropped
/// without being settled puts its task back at the tail of the queue as it
/// was, so an aborted worker never loses work.
#[derive(Debug)]
pub struct Lease {
    queue: Arc<DispatchQueue>,
    id: u64,
    task: EmailTask,
    settled: bool,
}

impl Lease {
    pub(super) const fn new(queue: Arc<DispatchQueue>, id: u64, task: EmailTask) -> Self {
        Self {
            queue,
            id,
            task,
            settled: false,
        }
    }

    #[must_use]
    pub const fn task(&self) -> &EmailTask {
        &self.task
    }

    /// The task was delivered
    pub fn complete(mut self) {
        self.settled = true;
        self.queue.settle(self.id);
    }

    /// The attempt failed and the task goes back to the tail
    ///
    /// Returns the task's new retry count.
    pub fn retry(mut self) -> u32 {
        self.settled = true;
        self.queue
            .requeue(self.id, |task| {
                task.record_failure();
            })
            .unwrap_or_else(|| self.task.retry_count().saturating_add(1))
    }

    /// The task has used up its retries and is dropped
    pub fn discard(mut self) {
        self.settled = true;
        self.queue.settle(self.id);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.settled {
            self.queue.requeue(self.id, |_| {});
        }
    }
}
