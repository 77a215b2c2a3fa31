//! The cache façade.
//!
//! The only entry point callers use. Every data operation runs through the
//! rate limiter, the retry loop and the circuit breaker before reaching the
//! remote store. When one of those gates rejects the call, or retries run
//! out, the façade answers from the [`FallbackCache`] and marks the result
//! degraded instead of returning a transport error.
//!
//! Writes made while the store is unavailable land only in the fallback
//! cache. They are not replayed to the store once it recovers.

use crate::fallback::{FallbackCache, FallbackStats};
use crate::health::HealthReport;
use crate::layers::{BreakerStore, MeteredStore, RateLimitedStore, RetryStore};
use crate::metrics::CacheMetrics;
use crate::store::RemoteStore;
use keystone_core::{CacheError, CacheResult};
use keystone_resilience::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter,
    RateLimiterConfig, RetryPolicy,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// `INFO` fields exposed by [`CacheFacade::store_info`].
pub const STORE_INFO_FIELDS: [&str; 7] = [
    "redis_version",
    "uptime_in_seconds",
    "connected_clients",
    "used_memory_human",
    "total_commands_processed",
    "keyspace_hits",
    "keyspace_misses",
];

/// Why an operation was answered without the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// The rate limiter rejected the call.
    RateLimited,
    /// The circuit breaker rejected the call.
    CircuitOpen,
    /// Every attempt failed with a transport error.
    RetriesExhausted,
}

impl DegradeReason {
    /// Classifies an error, or `None` if it must surface to the caller.
    #[must_use]
    pub const fn from_error(error: &CacheError) -> Option<Self> {
        match error {
            CacheError::RateLimited => Some(Self::RateLimited),
            CacheError::CircuitOpen(_) => Some(Self::CircuitOpen),
            CacheError::Transport(_) | CacheError::Timeout(_) => Some(Self::RetriesExhausted),
            _ => None,
        }
    }

    /// Returns the reason as a metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

/// Where a lookup was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The remote store answered.
    Remote,
    /// The fallback cache answered.
    Fallback(DegradeReason),
}

/// Result of a read.
///
/// Distinguishes fresh data, stale fallback data and no data at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<T = Vec<u8>> {
    value: Option<T>,
    source: Source,
}

impl<T> Lookup<T> {
    fn fresh(value: Option<T>) -> Self {
        Self {
            value,
            source: Source::Remote,
        }
    }

    fn degraded(value: Option<T>, reason: DegradeReason) -> Self {
        Self {
            value,
            source: Source::Fallback(reason),
        }
    }

    /// Whether a value was found.
    pub fn found(&self) -> bool {
        self.value.is_some()
    }

    /// Whether the answer came from the fallback cache.
    pub fn is_degraded(&self) -> bool {
        matches!(self.source, Source::Fallback(_))
    }

    /// Where the answer came from.
    pub fn source(&self) -> Source {
        self.source
    }

    /// Why the lookup was degraded, if it was.
    pub fn degrade_reason(&self) -> Option<DegradeReason> {
        match self.source {
            Source::Remote => None,
            Source::Fallback(reason) => Some(reason),
        }
    }

    /// Borrows the value.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Takes the value.
    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Takes the value, or fails with `NotFound`.
    pub fn require(self, key: &str) -> CacheResult<T> {
        self.value.ok_or_else(|| CacheError::not_found(key))
    }

    /// Maps the value, keeping the source.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        Lookup {
            value: self.value.map(f),
            source: self.source,
        }
    }

    /// Maps the value fallibly, keeping the source.
    pub fn try_map<U>(self, f: impl FnOnce(T) -> CacheResult<U>) -> CacheResult<Lookup<U>> {
        Ok(Lookup {
            value: self.value.map(f).transpose()?,
            source: self.source,
        })
    }
}

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written to the remote store and mirrored locally.
    Stored,
    /// Written to the fallback cache only.
    Degraded(DegradeReason),
}

impl WriteOutcome {
    /// Whether the write missed the remote store.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Construction parameters for [`CacheFacade`].
#[derive(Debug, Clone)]
pub struct CacheFacadeConfig {
    /// Name of the guarded dependency, used by the breaker.
    pub breaker_name: String,
    /// Circuit breaker settings.
    pub breaker: CircuitBreakerConfig,
    /// Retry settings.
    pub retry: RetryPolicy,
    /// Rate limiter settings.
    pub rate_limiter: RateLimiterConfig,
    /// TTL used by [`CacheFacade::put_default`].
    pub default_ttl: Duration,
}

impl Default for CacheFacadeConfig {
    fn default() -> Self {
        Self {
            breaker_name: "redis-service".to_string(),
            breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            rate_limiter: RateLimiterConfig::default(),
            default_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Fault-tolerant access to the remote store.
pub struct CacheFacade {
    data_path: Box<dyn RemoteStore>,
    health_path: Box<dyn RemoteStore>,
    breaker: Arc<CircuitBreaker>,
    fallback: FallbackCache,
    default_ttl: Duration,
    last_health: RwLock<HealthReport>,
}

impl CacheFacade {
    /// Builds the façade and its layer chains around `client`.
    pub fn new(client: Arc<dyn RemoteStore>, config: CacheFacadeConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker_name, config.breaker));

        let data_path = RateLimitedStore::new(
            RetryStore::new(
                BreakerStore::new(MeteredStore::new(Arc::clone(&client)), Arc::clone(&breaker)),
                config.retry,
            ),
            RateLimiter::new(config.rate_limiter),
        );
        let health_path = BreakerStore::new(MeteredStore::new(client), Arc::clone(&breaker));

        info!(
            breaker = %breaker.name(),
            default_ttl_secs = config.default_ttl.as_secs(),
            "Cache façade initialized"
        );

        Self {
            data_path: Box::new(data_path),
            health_path: Box::new(health_path),
            breaker,
            fallback: FallbackCache::new(),
            default_ttl: config.default_ttl,
            last_health: RwLock::new(HealthReport::unknown()),
        }
    }

    /// Reads `key`.
    ///
    /// A remote hit is mirrored into the fallback cache. A remote miss is
    /// returned as is, without consulting the fallback cache. Rate-limit,
    /// breaker and exhausted-retry failures are answered from the fallback
    /// cache. Data errors are returned.
    pub async fn get(&self, key: &str) -> CacheResult<Lookup> {
        match self.data_path.get(key).await {
            Ok(Some(value)) => {
                self.fallback.put(key, &value, None);
                Ok(Lookup::fresh(Some(value)))
            }
            Ok(None) => Ok(Lookup::fresh(None)),
            Err(e) => {
                let reason = self.degrade("get", key, e)?;
                Ok(Lookup::degraded(self.fallback.get(key), reason))
            }
        }
    }

    /// Writes `key`, mirroring the value into the fallback cache.
    ///
    /// If the remote write is rejected or fails, the value is written to the
    /// fallback cache only and the outcome is degraded.
    pub async fn put(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> CacheResult<WriteOutcome> {
        match self.data_path.set(key, value, ttl).await {
            Ok(()) => {
                self.fallback.put(key, value, ttl);
                Ok(WriteOutcome::Stored)
            }
            Err(e) => {
                let reason = self.degrade("put", key, e)?;
                self.fallback.put(key, value, ttl);
                Ok(WriteOutcome::Degraded(reason))
            }
        }
    }

    /// Writes `key` with the configured default TTL.
    pub async fn put_default(&self, key: &str, value: &[u8]) -> CacheResult<WriteOutcome> {
        self.put(key, value, Some(self.default_ttl)).await
    }

    /// Deletes `key` remotely and from the fallback cache.
    ///
    /// The local delete happens whatever the remote outcome. Returns whether
    /// the remote store removed a key, or, when degraded, whether the
    /// fallback cache did.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let remote = self.data_path.delete(key).await;
        let local = self.fallback.delete(key);

        match remote {
            Ok(removed) => Ok(removed > 0),
            Err(e) => {
                self.degrade("delete", key, e)?;
                Ok(local)
            }
        }
    }

    /// Checks `key` on the remote store. `false` on any failure.
    pub async fn exists(&self, key: &str) -> bool {
        match self.data_path.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                debug!(key, error = %e, "Exists check failed, reporting absent");
                CacheMetrics::degraded("exists", reason_label(&e));
                false
            }
        }
    }

    /// Sets the TTL of `key` on the remote store. `false` on any failure.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self.data_path.expire(key, ttl).await {
            Ok(applied) => applied,
            Err(e) => {
                debug!(key, error = %e, "Expire failed");
                CacheMetrics::degraded("expire", reason_label(&e));
                false
            }
        }
    }

    /// Reads and decodes a JSON value.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Lookup<T>> {
        self.get(key)
            .await?
            .try_map(|bytes| serde_json::from_slice(&bytes).map_err(CacheError::from))
    }

    /// Encodes and writes a JSON value.
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<WriteOutcome> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, &bytes, ttl).await
    }

    /// Pings the remote store through the breaker and records the result.
    ///
    /// Bypasses the rate limiter and the retry loop.
    pub async fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let result = self.health_path.ping().await;
        let latency = started.elapsed();

        let report = match result {
            Ok(()) => HealthReport::healthy(latency),
            Err(e @ CacheError::CircuitOpen(_)) => HealthReport::circuit_open(e.to_string()),
            Err(e) => HealthReport::unhealthy(latency, e.to_string()),
        };

        CacheMetrics::health_check(report.status.as_str(), latency);
        *self.last_health.write() = report.clone();
        report
    }

    /// The most recent health report, without contacting the store.
    pub fn health_status(&self) -> HealthReport {
        self.last_health.read().clone()
    }

    /// Starts a health check in the background and returns the last known
    /// report immediately.
    pub fn refresh_health_in_background(self: &Arc<Self>) -> HealthReport {
        let facade = Arc::clone(self);
        tokio::spawn(async move {
            facade.health_check().await;
        });
        self.health_status()
    }

    /// Informational subset of the store's `INFO`, read through the breaker.
    pub async fn store_info(&self) -> CacheResult<BTreeMap<String, String>> {
        let info = self.health_path.info().await?;
        Ok(STORE_INFO_FIELDS
            .iter()
            .filter_map(|field| info.get(*field).map(|v| ((*field).to_string(), v.clone())))
            .collect())
    }

    /// Current breaker state.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Breaker state and window statistics.
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Forces the breaker open.
    pub fn force_breaker_open(&self) {
        warn!(breaker = %self.breaker.name(), "Forcing circuit breaker open");
        self.breaker.force_open();
    }

    /// Forces the breaker closed.
    pub fn force_breaker_closed(&self) {
        warn!(breaker = %self.breaker.name(), "Forcing circuit breaker closed");
        self.breaker.force_closed();
    }

    /// Drops every fallback entry. Returns how many were dropped.
    pub fn clear_fallback_cache(&self) -> usize {
        let dropped = self.fallback.clear();
        info!(dropped, "Fallback cache cleared");
        dropped
    }

    /// Size and keys of the fallback cache.
    pub fn fallback_cache_stats(&self) -> FallbackStats {
        self.fallback.stats()
    }

    /// The TTL applied by [`put_default`](Self::put_default).
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn degrade(&self, operation: &'static str, key: &str, error: CacheError) -> CacheResult<DegradeReason> {
        match DegradeReason::from_error(&error) {
            Some(reason) => {
                warn!(operation, key, reason = reason.as_str(), error = %error, "Serving from fallback cache");
                CacheMetrics::degraded(operation, reason.as_str());
                Ok(reason)
            }
            None => Err(error),
        }
    }
}

fn reason_label(error: &CacheError) -> &'static str {
    DegradeReason::from_error(error).map_or("error", |r| r.as_str())
}

impl std::fmt::Debug for CacheFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFacade")
            .field("breaker", &self.breaker.name())
            .field("fallback_entries", &self.fallback.size())
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}
