//! Application builder.
//!
//! Every component is constructed here, once, and handed to its owner.

use keystone_cache::{
    create_pool, CacheFacade, CacheFacadeConfig, HealthMonitor, InMemoryStore, Lookup,
    RedisStore, RemoteStore, WriteOutcome,
};
use keystone_config::{AppConfig, RedisConfig};
use keystone_core::CacheResult;
use keystone_resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryPolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Key written and read back by the start-up self check.
pub const SELF_CHECK_KEY: &str = "health:ping";

/// Converts the configuration sections into façade settings.
pub fn facade_config(config: &AppConfig) -> CacheFacadeConfig {
    CacheFacadeConfig {
        breaker_name: config.breaker.name.clone(),
        breaker: CircuitBreakerConfig {
            failure_rate_threshold: config.breaker.failure_rate_threshold,
            minimum_calls: config.breaker.minimum_calls,
            window_size: config.breaker.window_size,
            open_duration: config.breaker.open_duration(),
        },
        retry: RetryPolicy {
            max_attempts: config.retry.max_attempts,
            base_delay: config.retry.base_delay(),
            max_delay: config.retry.max_delay(),
            multiplier: config.retry.backoff_multiplier,
            jitter: config.retry.jitter,
            ..Default::default()
        },
        rate_limiter: RateLimiterConfig {
            capacity: config.rate_limiter.capacity,
            refill_per_second: config.rate_limiter.refill_per_second,
        },
        default_ttl: config.redis.default_ttl(),
    }
}

/// Builds the remote store client.
///
/// Falls back to an in-process store when Redis is disabled.
pub fn build_store(config: &RedisConfig) -> CacheResult<Arc<dyn RemoteStore>> {
    if !config.enabled {
        warn!("Redis disabled, using in-process store");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    let pool = create_pool(&config.url, config.pool_size)?;
    Ok(Arc::new(RedisStore::new(pool, config.command_timeout())))
}

/// Writes and reads back [`SELF_CHECK_KEY`].
///
/// Returns whether the value came back fresh from the remote store.
/// Never fails the caller: problems are logged.
pub async fn self_check(facade: &CacheFacade) -> bool {
    let stamp = self_check_stamp();

    let write = match facade
        .put(SELF_CHECK_KEY, stamp.as_bytes(), Some(Duration::from_secs(60)))
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "Self check write failed");
            return false;
        }
    };

    let read: Lookup = match facade.get(SELF_CHECK_KEY).await {
        Ok(lookup) => lookup,
        Err(e) => {
            warn!(error = %e, "Self check read failed");
            return false;
        }
    };

    let round_trip = read.value().map(Vec::as_slice) == Some(stamp.as_bytes());
    let healthy = write == WriteOutcome::Stored && !read.is_degraded() && round_trip;
    if healthy {
        info!("Self check passed");
    } else {
        warn!(
            write = ?write,
            degraded = read.is_degraded(),
            round_trip,
            "Self check degraded, serving from fallback cache"
        );
    }
    healthy
}

fn self_check_stamp() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    nanos.to_string()
}

/// A fully wired application.
pub struct App {
    config: AppConfig,
    facade: Arc<CacheFacade>,
}

impl App {
    /// The façade owned by this application.
    pub fn facade(&self) -> &Arc<CacheFacade> {
        &self.facade
    }

    /// The configuration the application was built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs the self check, starts the health monitor and waits for
    /// `shutdown` to resolve.
    pub async fn run<F>(self, shutdown: F) -> CacheResult<()>
    where
        F: Future<Output = ()>,
    {
        self_check(&self.facade).await;

        let monitor = self
            .config
            .health
            .enabled
            .then(|| HealthMonitor::spawn(Arc::clone(&self.facade), self.config.health.interval()));

        shutdown.await;

        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }

        let stats = self.facade.fallback_cache_stats();
        info!(
            fallback_entries = stats.size,
            breaker = %self.facade.breaker_state(),
            "Cache façade stopped"
        );
        Ok(())
    }
}

/// Application builder for constructing the server.
pub struct AppBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn RemoteStore>>,
}

impl AppBuilder {
    /// Creates a new application builder.
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `store` instead of building one from the Redis settings.
    pub fn with_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the application.
    pub fn build(self) -> CacheResult<App> {
        let config = self.config.unwrap_or_default();
        let store = match self.store {
            Some(store) => store,
            None => build_store(&config.redis)?,
        };
        let facade = Arc::new(CacheFacade::new(store, facade_config(&config)));
        Ok(App { config, facade })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
