//! Timeout wrapper for async operations.

use keystone_core::{CacheError, CacheResult};
use std::time::Duration;

/// Wraps an async operation with a fixed deadline.
///
/// Exceeding the deadline yields [`CacheError::Timeout`], which is a
/// retryable transport failure.
pub async fn with_timeout<F, Fut, T>(duration: Duration, f: F) -> CacheResult<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = CacheResult<T>>,
{
    tokio::time::timeout(duration, f())
        .await
        .map_err(|_| CacheError::Timeout(format!("Operation timed out after {:?}", duration)))?
}
