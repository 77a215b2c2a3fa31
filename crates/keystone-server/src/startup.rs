//! Server startup utilities.

use keystone_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    __ __                __
   / //_/__  __  _______/ /_____  ____  ___
  / ,< / _ \/ / / / ___/ __/ __ \/ __ \/ _ \
 / /| /  __/ /_/ (__  ) /_/ /_/ / / / /  __/
/_/ |_\___/\__, /____/\__/\____/_/ /_/\___/
          /____/
    "#);
}

/// Summarises the effective resilience settings, one line per concern.
pub fn startup_lines(config: &AppConfig) -> Vec<String> {
    let backend = if config.redis.enabled {
        format!(
            "redis {} (pool {}, timeout {}ms)",
            config.redis.redacted_url(),
            config.redis.pool_size,
            config.redis.command_timeout_ms
        )
    } else {
        "in-process store".to_string()
    };

    vec![
        format!("Store:     {}", backend),
        format!(
            "Breaker:   {} opens at {:.0}% over {} calls (min {}), {}s open",
            config.breaker.name,
            config.breaker.failure_rate_threshold * 100.0,
            config.breaker.window_size,
            config.breaker.minimum_calls,
            config.breaker.open_duration_secs
        ),
        format!(
            "Retry:     {} attempts, {}ms x{} up to {}ms",
            config.retry.max_attempts,
            config.retry.base_delay_ms,
            config.retry.backoff_multiplier,
            config.retry.max_delay_ms
        ),
        format!(
            "Limiter:   {} burst, {}/s",
            config.rate_limiter.capacity, config.rate_limiter.refill_per_second
        ),
        format!(
            "Health:    {}",
            if config.health.enabled {
                format!("every {}s", config.health.interval_secs)
            } else {
                "disabled".to_string()
            }
        ),
    ]
}

/// Prints server startup information.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    for line in startup_lines(config) {
        info!("{}", line);
    }
    info!("{}", separator);
}
