//! Retry policy for transient backend failures.
//!
//! Delays grow exponentially from `initial_backoff_ms` up to
//! `max_backoff_ms`. A server-signalled retry-after replaces the computed
//! delay (still capped). The cumulative wait across all retries of one call
//! never exceeds `max_total_wait_ms`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry-with-backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum single backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Maximum cumulative wait across all retries in milliseconds.
    pub max_total_wait_ms: u64,
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Policy with the given retry count and no waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
            max_backoff_ms: 0,
            max_total_wait_ms: 0,
        }
    }

    /// Backoff delay for a given attempt number (0-indexed; attempt 0 has no delay).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Whether another retry is allowed after `retries_done` retries.
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Delay before `attempt`, preferring a signalled retry-after.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let cap = Duration::from_millis(self.max_backoff_ms);
        match retry_after {
            Some(hint) => hint.min(cap),
            None => Duration::from_millis(self.backoff_ms(attempt)),
        }
    }

    /// Whether waiting `next` more on top of `waited` stays within the total budget.
    pub fn fits_wait_budget(&self, waited: Duration, next: Duration) -> bool {
        waited + next <= Duration::from_millis(self.max_total_wait_ms)
    }
}

impl Default for RetryPolicy {
    /// Default: 3 retries, 1s initial backoff, 2x multiplier, 20s cap, 60s total.
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 20_000,
            max_total_wait_ms: 60_000,
        }
    }
}
