//! Configuration validation module.
//!
//! Validates every section up front so that a bad deployment fails at
//! start-up rather than on the first degraded call.

use crate::AppConfig;
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Pool size must be positive.
    EmptyPool,
    /// Failure rate threshold must lie in (0.0, 1.0].
    InvalidFailureRate { value: f64 },
    /// Window size must be positive.
    EmptyWindow,
    /// Minimum calls cannot exceed the window size.
    MinimumCallsExceedWindow { minimum_calls: usize, window_size: usize },
    /// At least one attempt is required.
    NoAttempts,
    /// Backoff multiplier must be at least 1.0.
    InvalidMultiplier { value: f64 },
    /// A duration or rate that must be positive is zero.
    NonPositive { name: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::EmptyPool => write!(f, "Redis pool size must be positive"),
            Self::InvalidFailureRate { value } => {
                write!(
                    f,
                    "Invalid failure rate threshold: {} (must be in (0.0, 1.0])",
                    value
                )
            }
            Self::EmptyWindow => write!(f, "Breaker window size must be positive"),
            Self::MinimumCallsExceedWindow {
                minimum_calls,
                window_size,
            } => {
                write!(
                    f,
                    "Breaker minimum calls ({}) cannot exceed window size ({})",
                    minimum_calls, window_size
                )
            }
            Self::NoAttempts => write!(f, "Retry max_attempts must be at least 1"),
            Self::InvalidMultiplier { value } => {
                write!(f, "Invalid backoff multiplier: {} (must be >= 1.0)", value)
            }
            Self::NonPositive { name } => write!(f, "'{}' must be positive", name),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_redis(&config.redis, &mut errors);
        Self::validate_breaker(&config.breaker, &mut errors);
        Self::validate_retry(&config.retry, &mut errors);
        Self::validate_rate_limiter(&config.rate_limiter, &mut errors);
        Self::validate_health(&config.health, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_redis(config: &crate::RedisConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.command_timeout_ms == 0 {
            errors.push(ConfigValidationError::NonPositive {
                name: "redis.command_timeout_ms".to_string(),
            });
        }

        if !config.enabled {
            return;
        }

        if config.url.is_empty() {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        } else if !config.url.starts_with("redis://") && !config.url.starts_with("rediss://") {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            });
        } else if let Err(e) = Url::parse(&config.url) {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            });
        }

        if config.pool_size == 0 {
            errors.push(ConfigValidationError::EmptyPool);
        }
    }

    fn validate_breaker(config: &crate::BreakerConfig, errors: &mut Vec<ConfigValidationError>) {
        let rate = config.failure_rate_threshold;
        if !(rate > 0.0 && rate <= 1.0) {
            errors.push(ConfigValidationError::InvalidFailureRate { value: rate });
        }

        if config.window_size == 0 {
            errors.push(ConfigValidationError::EmptyWindow);
        } else if config.minimum_calls > config.window_size {
            errors.push(ConfigValidationError::MinimumCallsExceedWindow {
                minimum_calls: config.minimum_calls,
                window_size: config.window_size,
            });
        }

        if config.open_duration_secs == 0 {
            errors.push(ConfigValidationError::NonPositive {
                name: "breaker.open_duration_secs".to_string(),
            });
        }
    }

    fn validate_retry(config: &crate::RetryConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.max_attempts == 0 {
            errors.push(ConfigValidationError::NoAttempts);
        }
        if config.backoff_multiplier < 1.0 || config.backoff_multiplier.is_nan() {
            errors.push(ConfigValidationError::InvalidMultiplier {
                value: config.backoff_multiplier,
            });
        }
    }

    fn validate_rate_limiter(
        config: &crate::RateLimiterSettings,
        errors: &mut Vec<ConfigValidationError>,
    ) {
        if config.capacity == 0 {
            errors.push(ConfigValidationError::NonPositive {
                name: "rate_limiter.capacity".to_string(),
            });
        }
        if config.refill_per_second == 0 {
            errors.push(ConfigValidationError::NonPositive {
                name: "rate_limiter.refill_per_second".to_string(),
            });
        }
    }

    fn validate_health(config: &crate::HealthConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.enabled && config.interval_secs == 0 {
            errors.push(ConfigValidationError::NonPositive {
                name: "health.interval_secs".to_string(),
            });
        }
    }
}
