//! Retry policy implementation.

use keystone_core::{CacheError, CacheResult};
use std::time::Duration;
use tracing::debug;

/// Retry policy configuration.
///
/// Immutable once built; the same policy is shared by every call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
    /// Decides whether a failed attempt may be retried.
    pub retry_on: fn(&CacheError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: false,
            retry_on: CacheError::is_retriable,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with the specified max attempts.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::with_max_attempts(1)
    }

    /// Calculates the delay after the given failed attempt (1-based).
    ///
    /// `base_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_delay = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay = Duration::from_millis(base_delay.min(self.max_delay.as_millis() as f64) as u64);

        if self.jitter {
            // Up to 25% either way
            let jitter_factor = 1.0 + (rand_simple() * 0.5 - 0.25);
            Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64)
        } else {
            delay
        }
    }

    /// Returns whether the policy retries this error.
    pub fn is_retryable(&self, error: &CacheError) -> bool {
        (self.retry_on)(error)
    }

    /// Executes a function with retry logic.
    ///
    /// Non-retryable errors abort immediately; otherwise the last error is
    /// returned once `max_attempts` is exhausted.
    pub async fn execute<F, Fut, T>(&self, mut f: F) -> CacheResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = CacheResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < max_attempts && self.is_retryable(&e) => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!("Attempt {} failed: {}; retrying after {:?}", attempt, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        debug!("Giving up after {} attempts: {}", attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Simple pseudo-random number in `[0, 1)` for jitter.
#[allow(clippy::cast_precision_loss)]
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
