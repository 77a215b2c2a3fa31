//! # Keystone Resilience
//!
//! Resilience primitives guarding calls to the remote store.
//! Provides a sliding-window circuit breaker, a token-bucket rate limiter,
//! a retry policy with exponential backoff, and a fixed-deadline timeout.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::*;
pub use rate_limiter::*;
pub use retry::*;
pub use timeout::*;
