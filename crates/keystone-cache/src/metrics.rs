//! Metrics for cache access monitoring.
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding application.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the cache-access layer.
pub mod names {
    /// Remote store operations by outcome.
    pub const REMOTE_OPERATIONS_TOTAL: &str = "keystone_cache_remote_operations_total";
    /// Remote store operation duration in seconds.
    pub const REMOTE_OPERATION_DURATION: &str = "keystone_cache_remote_operation_duration_seconds";
    /// Retries issued against the remote store.
    pub const RETRIES_TOTAL: &str = "keystone_cache_retries_total";
    /// Operations answered in degraded mode.
    pub const DEGRADED_TOTAL: &str = "keystone_cache_degraded_total";

    /// Fallback cache hits.
    pub const FALLBACK_HITS_TOTAL: &str = "keystone_cache_fallback_hits_total";
    /// Fallback cache misses.
    pub const FALLBACK_MISSES_TOTAL: &str = "keystone_cache_fallback_misses_total";
    /// Current fallback cache size.
    pub const FALLBACK_ENTRIES: &str = "keystone_cache_fallback_entries";

    /// Health check duration in seconds.
    pub const HEALTH_CHECK_DURATION: &str = "keystone_cache_health_check_duration_seconds";
    /// Last health status (1 healthy, 0 otherwise).
    pub const HEALTH_STATUS: &str = "keystone_cache_health_status";

    /// Circuit breaker state transitions.
    pub const BREAKER_TRANSITIONS_TOTAL: &str = keystone_resilience::BREAKER_TRANSITIONS_TOTAL;
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Remote store
    describe_counter!(
        names::REMOTE_OPERATIONS_TOTAL,
        "Total number of remote store operations by outcome"
    );
    describe_histogram!(
        names::REMOTE_OPERATION_DURATION,
        "Remote store operation duration in seconds"
    );
    describe_counter!(
        names::RETRIES_TOTAL,
        "Total number of retried remote store operations"
    );
    describe_counter!(
        names::DEGRADED_TOTAL,
        "Total number of operations answered without the remote store"
    );

    // Fallback cache
    describe_counter!(
        names::FALLBACK_HITS_TOTAL,
        "Total number of fallback cache hits"
    );
    describe_counter!(
        names::FALLBACK_MISSES_TOTAL,
        "Total number of fallback cache misses"
    );
    describe_gauge!(
        names::FALLBACK_ENTRIES,
        "Current number of entries in the fallback cache"
    );

    // Health
    describe_histogram!(
        names::HEALTH_CHECK_DURATION,
        "Health check duration in seconds"
    );
    describe_gauge!(
        names::HEALTH_STATUS,
        "Whether the last health check was healthy (1) or not (0)"
    );

    describe_counter!(
        names::BREAKER_TRANSITIONS_TOTAL,
        "Total number of circuit breaker state transitions"
    );
}

/// Cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a completed remote operation.
    pub fn remote_operation(operation: &'static str, success: bool, duration: Duration) {
        counter!(
            names::REMOTE_OPERATIONS_TOTAL,
            "operation" => operation,
            "outcome" => if success { "success" } else { "error" }
        )
        .increment(1);

        histogram!(
            names::REMOTE_OPERATION_DURATION,
            "operation" => operation
        )
        .record(duration.as_secs_f64());
    }

    /// Record a retry.
    pub fn retry(operation: &'static str) {
        counter!(names::RETRIES_TOTAL, "operation" => operation).increment(1);
    }

    /// Record an operation answered in degraded mode.
    pub fn degraded(operation: &'static str, reason: &'static str) {
        counter!(
            names::DEGRADED_TOTAL,
            "operation" => operation,
            "reason" => reason
        )
        .increment(1);
    }

    /// Record a fallback lookup.
    pub fn fallback_lookup(hit: bool) {
        if hit {
            counter!(names::FALLBACK_HITS_TOTAL).increment(1);
        } else {
            counter!(names::FALLBACK_MISSES_TOTAL).increment(1);
        }
    }

    /// Update the fallback size gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn fallback_size(entries: usize) {
        gauge!(names::FALLBACK_ENTRIES).set(entries as f64);
    }

    /// Record a health check.
    pub fn health_check(status: &'static str, duration: Duration) {
        histogram!(names::HEALTH_CHECK_DURATION, "status" => status).record(duration.as_secs_f64());
        gauge!(names::HEALTH_STATUS).set(if status == "healthy" { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // Just verify registration doesn't panic
        register_metrics();
    }

    #[test]
    fn test_cache_metrics() {
        CacheMetrics::remote_operation("get", true, Duration::from_millis(3));
        CacheMetrics::retry("get");
        CacheMetrics::degraded("get", "circuit_open");
        CacheMetrics::fallback_lookup(true);
        CacheMetrics::fallback_lookup(false);
        CacheMetrics::fallback_size(2);
        CacheMetrics::health_check("healthy", Duration::from_millis(1));
    }
}
