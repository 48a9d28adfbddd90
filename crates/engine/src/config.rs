//! Engine tuning knobs.

use std::time::Duration;

/// Retry behaviour for retriable step failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per step, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }
}

/// Configuration for the run service and its workers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Runs a worker executes at the same time.
    pub max_concurrent_runs: usize,
    /// How long an idle worker waits before polling the queue again.
    pub poll_interval: Duration,
    /// Buffered status events per channel before slow subscribers lag.
    pub status_channel_capacity: usize,
    /// How often a running job's queue lease is renewed. Keep it well under
    /// the queue's lease so a live run is never reclaimed.
    pub job_heartbeat: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 8,
            poll_interval: Duration::from_millis(500),
            status_channel_capacity: 256,
            job_heartbeat: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}
