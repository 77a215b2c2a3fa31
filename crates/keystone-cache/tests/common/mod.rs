//! Shared fixtures for façade integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use keystone_cache::{CacheFacade, CacheFacadeConfig, InMemoryStore, RemoteStore};
use keystone_core::{CacheError, CacheResult};
use keystone_resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryPolicy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Failure injected into every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Transport,
    Timeout,
    Data,
}

/// An [`InMemoryStore`] with scripted faults, latency and a call counter.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    inner: InMemoryStore,
    fault: Mutex<Option<Fault>>,
    latency: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock() = Some(fault);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Calls that reached the store, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    /// The store behind the faults, bypassing them.
    pub fn backing(&self) -> &InMemoryStore {
        &self.inner
    }

    async fn enter(&self) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let fault = (*self.fault.lock()).unwrap_or(Fault::None);
        match fault {
            Fault::None => Ok(()),
            Fault::Transport => Err(CacheError::transport("connection refused")),
            Fault::Timeout => Err(CacheError::Timeout("command timed out".to_string())),
            Fault::Data => Err(CacheError::data("WRONGTYPE")),
        }
    }
}

#[async_trait]
impl RemoteStore for ScriptedStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.enter().await?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.enter().await?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        self.enter().await?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.enter().await?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.enter().await?;
        self.inner.expire(key, ttl).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.enter().await?;
        self.inner.ping().await
    }

    async fn info(&self) -> CacheResult<HashMap<String, String>> {
        self.enter().await?;
        self.inner.info().await
    }
}

/// Façade settings with fast retries and a roomy rate limit.
pub fn test_config() -> CacheFacadeConfig {
    CacheFacadeConfig {
        breaker_name: "redis-service".to_string(),
        breaker: CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            minimum_calls: 10,
            window_size: 100,
            open_duration: Duration::from_secs(30),
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        },
        rate_limiter: RateLimiterConfig {
            capacity: 10_000,
            refill_per_second: 10_000,
        },
        default_ttl: Duration::from_secs(30 * 60),
    }
}

pub fn facade_with(store: &Arc<ScriptedStore>, config: CacheFacadeConfig) -> Arc<CacheFacade> {
    let client: Arc<dyn RemoteStore> = Arc::clone(store) as Arc<dyn RemoteStore>;
    Arc::new(CacheFacade::new(client, config))
}

pub fn facade(store: &Arc<ScriptedStore>) -> Arc<CacheFacade> {
    facade_with(store, test_config())
}
