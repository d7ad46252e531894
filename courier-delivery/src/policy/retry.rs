//! Retry policy for delivery attempts.

use std::time::Duration;

use rand::Rng;

/// How often a failing task is retried and how long a worker pauses after
/// each failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub retry_limit: u32,

    /// Pause taken by a worker after re-queueing a failed task.
    pub backoff: Duration,

    /// Randomises the pause within ±`jitter_factor`. Zero gives a fixed pause.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            backoff: Duration::from_secs(5),
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a task that has failed `retry_count` times before this
    /// attempt may be re-queued.
    #[must_use]
    pub const fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.retry_limit
    }

    /// Returns `0` once the limit has been reached.
    #[must_use]
    pub const fn remaining_retries(&self, retry_count: u32) -> u32 {
        self.retry_limit.saturating_sub(retry_count)
    }

    /// Pause before the worker's next iteration
    #[must_use]
    pub fn backoff_delay(&self) -> Duration {
        let factor = if self.jitter_factor.is_finite() {
            self.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };

        if factor <= 0.0 || self.backoff.is_zero() {
            return self.backoff;
        }

        let base = self.backoff.as_secs_f64();
        let jitter_range = base * factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);

        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}
