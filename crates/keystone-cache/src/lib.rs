//! # Keystone Cache
//!
//! Fault-tolerant access to a remote key-value store.
//!
//! [`CacheFacade`] composes a rate limiter, a retry loop and a circuit
//! breaker in front of a [`RemoteStore`], and answers from an in-process
//! [`FallbackCache`] whenever the store cannot be reached. Callers always get
//! a typed outcome telling fresh data, stale data and no data apart.

pub mod facade;
pub mod fallback;
pub mod health;
pub mod layers;
pub mod metrics;
pub mod store;

pub use facade::{
    CacheFacade, CacheFacadeConfig, DegradeReason, Lookup, Source, WriteOutcome,
    STORE_INFO_FIELDS,
};
pub use fallback::{CacheEntry, FallbackCache, FallbackStats};
pub use health::{HealthMonitor, HealthReport, HealthStatus, MIN_HEALTH_INTERVAL};
pub use layers::{BreakerStore, MeteredStore, RateLimitedStore, RetryStore};
pub use metrics::{register_metrics, CacheMetrics};
pub use store::{create_pool, InMemoryStore, RedisStore, RemoteStore};
