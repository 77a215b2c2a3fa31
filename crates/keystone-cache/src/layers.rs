//! Resilience layers over a [`RemoteStore`].
//!
//! Each layer wraps another store and implements the trait itself, so the
//! data path is assembled by plain composition, outermost first:
//!
//! ```text
//! RateLimitedStore -> RetryStore -> BreakerStore -> MeteredStore -> client
//! ```
//!
//! The breaker sits inside the retry loop: every attempt is counted, and a
//! trip mid-retry aborts the remaining attempts with `CircuitOpen`.

use crate::metrics::CacheMetrics;
use crate::store::RemoteStore;
use async_trait::async_trait;
use keystone_core::CacheResult;
use keystone_resilience::{CircuitBreaker, RateLimiter, RetryPolicy};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records latency and outcome of every call to the wrapped store.
#[derive(Debug, Clone)]
pub struct MeteredStore<S> {
    inner: S,
}

impl<S: RemoteStore> MeteredStore<S> {
    /// Wraps a store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    async fn observe<T, Fut>(operation: &'static str, call: Fut) -> CacheResult<T>
    where
        Fut: Future<Output = CacheResult<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        CacheMetrics::remote_operation(operation, result.is_ok(), started.elapsed());
        result
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for MeteredStore<S> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Self::observe("get", self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        Self::observe("set", self.inner.set(key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        Self::observe("delete", self.inner.delete(key)).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Self::observe("exists", self.inner.exists(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        Self::observe("expire", self.inner.expire(key, ttl)).await
    }

    async fn ping(&self) -> CacheResult<()> {
        Self::observe("ping", self.inner.ping()).await
    }

    async fn info(&self) -> CacheResult<HashMap<String, String>> {
        Self::observe("info", self.inner.info()).await
    }
}

/// Routes every call through a shared circuit breaker.
///
/// Rejected calls fail with `CircuitOpen` and never reach the wrapped store.
#[derive(Debug, Clone)]
pub struct BreakerStore<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S: RemoteStore> BreakerStore<S> {
    /// Wraps a store with the given breaker.
    pub fn new(inner: S, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    /// The breaker guarding this store.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for BreakerStore<S> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.breaker.call(|| self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.breaker.call(|| self.inner.set(key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        self.breaker.call(|| self.inner.delete(key)).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.breaker.call(|| self.inner.exists(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.breaker.call(|| self.inner.expire(key, ttl)).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.breaker.call(|| self.inner.ping()).await
    }

    async fn info(&self) -> CacheResult<HashMap<String, String>> {
        self.breaker.call(|| self.inner.info()).await
    }
}

/// Retries retryable failures of the wrapped store.
#[derive(Debug, Clone)]
pub struct RetryStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RemoteStore> RetryStore<S> {
    /// Wraps a store with the given policy.
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut call: F) -> CacheResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = CacheResult<T>> + Send,
    {
        let attempts = AtomicU32::new(0);
        self.policy
            .execute(|| {
                if attempts.fetch_add(1, Ordering::Relaxed) > 0 {
                    CacheMetrics::retry(operation);
                }
                call()
            })
            .await
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RetryStore<S> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.retrying("get", || self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.retrying("set", || self.inner.set(key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        self.retrying("delete", || self.inner.delete(key)).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.retrying("exists", || self.inner.exists(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.retrying("expire", || self.inner.expire(key, ttl)).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.retrying("ping", || self.inner.ping()).await
    }

    async fn info(&self) -> CacheResult<HashMap<String, String>> {
        self.retrying("info", || self.inner.info()).await
    }
}

/// Admits calls through a token bucket; rejected calls fail with
/// `RateLimited` before any remote I/O.
#[derive(Debug, Clone)]
pub struct RateLimitedStore<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S: RemoteStore> RateLimitedStore<S> {
    /// Wraps a store with the given limiter.
    pub fn new(inner: S, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RateLimitedStore<S> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.limiter.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.limiter.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        self.limiter.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.limiter.check()?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.limiter.check()?;
        self.inner.expire(key, ttl).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.limiter.check()?;
        self.inner.ping().await
    }

    async fn info(&self) -> CacheResult<HashMap<String, String>> {
        self.limiter.check()?;
        self.inner.info().await
    }
}
