//! In-memory dispatch queue shared by producers and workers

mod journal;
mod lease;

use std::{
    collections::{BTreeMap, VecDeque},
    pin::pin,
    sync::Arc,
};

use courier_common::EmailTask;
pub use journal::Journal;
pub use lease::Lease;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<EmailTask>,
    /// Copies of tasks currently held by a worker, keyed by lease id so they
    /// come out oldest-first.
    in_flight: BTreeMap<u64, EmailTask>,
    next_lease: u64,
}

/// FIFO queue of tasks awaiting delivery
///
/// Tasks handed to a worker are not forgotten: the queue keeps a copy until
/// the worker settles its [`Lease`], so a snapshot taken mid-delivery still
/// contains them.
///
/// # Thread Safety
/// All state sits behind a single `parking_lot::Mutex` that is only held for
/// the duration of a queue operation, never across an `.await`.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    state: Mutex<QueueState>,
    changed: Notify,
}

impl DispatchQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue from a restored snapshot, preserving its order
    #[must_use]
    pub fn from_tasks(tasks: Vec<EmailTask>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: tasks.into(),
                ..QueueState::default()
            }),
            changed: Notify::new(),
        }
    }

    /// Append a task at the tail
    pub fn enqueue(&self, task: EmailTask) {
        self.state.lock().pending.push_back(task);
        self.changed.notify_waiters();
    }

    /// Take the task at the head, if any
    ///
    /// Concurrent callers always receive distinct tasks.
    pub fn try_dequeue(self: &Arc<Self>) -> Option<Lease> {
        let mut state = self.state.lock();
        let task = state.pending.pop_front()?;

        let id = state.next_lease;
        state.next_lease = state.next_lease.wrapping_add(1);
        state.in_flight.insert(id, task.clone());

        Some(Lease::new(Arc::clone(self), id, task))
    }

    /// Number of tasks waiting to be picked up
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether no task is waiting to be picked up
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Number of tasks currently held by workers
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Nothing is waiting and no worker holds a task, so nothing can come back
    #[must_use]
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty() && state.in_flight.is_empty()
    }

    /// Tasks waiting to be picked up, head first
    #[must_use]
    pub fn contents(&self) -> Vec<EmailTask> {
        self.state.lock().pending.iter().cloned().collect()
    }

    /// Every task not yet delivered or given up on
    ///
    /// In-flight tasks come first, oldest lease first, followed by the
    /// pending tasks in queue order. This is what gets snapshotted.
    #[must_use]
    pub fn durable_contents(&self) -> Vec<EmailTask> {
        let state = self.state.lock();
        state
            .in_flight
            .values()
            .chain(state.pending.iter())
            .cloned()
            .collect()
    }

    /// Resolve once a task is waiting
    pub async fn wait_for_task(&self) {
        self.wait_until(|state| !state.pending.is_empty()).await;
    }

    /// Resolve once a task is waiting or the queue is drained
    pub async fn wait_for_task_or_drained(&self) {
        self.wait_until(|state| !state.pending.is_empty() || state.in_flight.is_empty())
            .await;
    }

    async fn wait_until(&self, ready: impl Fn(&QueueState) -> bool) {
        loop {
            // Register interest before checking, so a change that lands in
            // between is not missed.
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();

            let ready_now = ready(&self.state.lock());
            if ready_now {
                return;
            }

            notified.await;
        }
    }

    fn settle(&self, id: u64) {
        self.state.lock().in_flight.remove(&id);
        self.changed.notify_waiters();
    }

    fn requeue(&self, id: u64, update: impl FnOnce(&mut EmailTask)) -> Option<u32> {
        let retry_count = {
            let mut state = self.state.lock();
            let mut task = state.in_flight.remove(&id)?;
            update(&mut task);
            let retry_count = task.retry_count();
            state.pending.push_back(task);
            retry_count
        };

        self.changed.notify_waiters();
        Some(retry_count)
    }
}
