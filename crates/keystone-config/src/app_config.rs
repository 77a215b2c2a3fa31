//! Application configuration structures.

use keystone_core::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Remote store (Redis) configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Circuit breaker configuration.
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate limiter configuration.
    #[serde(default)]
    pub rate_limiter: RateLimiterSettings,

    /// Background health probe configuration.
    #[serde(default)]
    pub health: HealthConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "keystone".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Use Redis; when disabled an in-process store stands in.
    pub enabled: bool,
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Fixed deadline for every remote command, in milliseconds.
    pub command_timeout_ms: u64,
    /// TTL applied by writes that do not name one, in seconds.
    pub default_ttl_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            command_timeout_ms: 2000,
            default_ttl_secs: 1800, // 30 minutes
        }
    }
}

impl RedisConfig {
    /// Returns the command timeout as a Duration.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Returns the default TTL as a Duration.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// The URL with any password masked, for logging.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    // Only fails for URLs without a host, which carry no password.
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => "<unparseable url>".to_string(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Name of the guarded dependency.
    pub name: String,
    /// Failure rate at or above which the circuit opens.
    pub failure_rate_threshold: f64,
    /// Minimum buffered calls before the failure rate is evaluated.
    pub minimum_calls: usize,
    /// Sliding window size in calls.
    pub window_size: usize,
    /// Time spent open before a half-open probe, in seconds.
    pub open_duration_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "redis-service".to_string(),
            failure_rate_threshold: 0.5,
            minimum_calls: 10,
            window_size: 100,
            open_duration_secs: 30,
        }
    }
}

impl BreakerConfig {
    /// Returns the open duration as a Duration.
    #[must_use]
    pub const fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_duration_secs)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Add up to 25% jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 2000,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Returns the base delay as a Duration.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Returns the maximum delay as a Duration.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterSettings {
    /// Bucket capacity (burst size).
    pub capacity: u32,
    /// Tokens refilled per second.
    pub refill_per_second: u32,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_per_second: 50,
        }
    }
}

/// Background health probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Run the periodic probe.
    pub enabled: bool,
    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15,
        }
    }
}

impl HealthConfig {
    /// Returns the probe interval as a Duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
