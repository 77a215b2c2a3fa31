//! Rate limiter implementation.
//!
//! A token bucket of `capacity` tokens refilled at `refill_per_second`,
//! backed by governor's GCRA limiter. Admission is non-blocking: a caller
//! that finds the bucket empty is rejected immediately.

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use keystone_core::{CacheError, CacheResult};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum burst size (bucket capacity).
    pub capacity: u32,
    /// Tokens added back per second.
    pub refill_per_second: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_per_second: 50,
        }
    }
}

/// Rate limiter bounding the number of calls that reach the remote store.
pub struct RateLimiter {
    limiter: Arc<GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Creates a new rate limiter from a bucket configuration.
    ///
    /// Zero values are raised to one.
    pub fn new(config: RateLimiterConfig) -> Self {
        let refill = NonZeroU32::new(config.refill_per_second).unwrap_or(NonZeroU32::MIN);
        let capacity = NonZeroU32::new(config.capacity).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(refill).allow_burst(capacity);
        let limiter = Arc::new(GovernorRateLimiter::direct(quota));
        Self { limiter, config }
    }

    /// Creates a rate limiter whose burst equals its per-second rate.
    pub fn per_second(requests: u32) -> Self {
        Self::new(RateLimiterConfig {
            capacity: requests,
            refill_per_second: requests,
        })
    }

    /// Returns the bucket configuration.
    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }

    /// Takes one token if available (non-blocking).
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Takes one token or fails with [`CacheError::RateLimited`].
    pub fn check(&self) -> CacheResult<()> {
        self.limiter.check().map_err(|not_until| {
            debug!(retry_after = ?not_until, "Rate limit exceeded");
            CacheError::RateLimited
        })
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            config: self.config,
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
