//! Bounded retry with linear backoff.
//!
//! Attempt `n` (1-based) that fails is followed by a pause of
//! `base_delay * n` before attempt `n + 1`. No pause follows the last attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Delay unit multiplied by the attempt number.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Pause after a failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Decide whether failed attempt `attempt` may be retried. If so, log it,
    /// wait out the backoff and return true.
    ///
    /// Loops that cannot hand a closure to [`run`](Self::run), such as a
    /// scanner borrowed mutably across attempts, drive their own attempt
    /// counter through this.
    pub async fn pause_before_retry(
        &self,
        operation_name: &str,
        attempt: u32,
        error: &MigrateError,
    ) -> bool {
        let max_attempts = self.max_attempts.max(1);
        if !error.is_retryable() || attempt >= max_attempts {
            return false;
        }
        let delay = self.delay_after(attempt);
        warn!(
            "{}: attempt {}/{} failed, retrying in {:?}: {}",
            operation_name, attempt, max_attempts, delay, error
        );
        sleep(delay).await;
        true
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts are used up. The closure receives the attempt number.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{}: succeeded on attempt {}", operation_name, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !self.pause_before_retry(operation_name, attempt, &e).await {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
