//! Error taxonomy for the cache-access layer.

use thiserror::Error;

/// Unified error type for all Keystone crates.
///
/// Variants are grouped by how the façade reacts to them: transport failures
/// are retried and count against the circuit breaker, data errors surface
/// immediately, and admission rejections never reach the remote store.
#[derive(Error, Debug)]
pub enum CacheError {
    // ============ Transport Errors ============
    /// Connection refused, dropped or otherwise broken I/O to the remote store.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A remote call exceeded its fixed deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Data Errors ============
    /// Type mismatch or decode failure; the remote store answered.
    #[error("Data error: {0}")]
    Data(String),

    // ============ Admission Errors ============
    /// The rate limiter rejected the call before any remote I/O.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The circuit breaker rejected the call before any remote I/O.
    #[error("Service unavailable: circuit breaker open for {0}")]
    CircuitOpen(String),

    // ============ Lookup Errors ============
    /// Key absent from both the remote store and the fallback cache.
    #[error("Key not found: {0}")]
    NotFound(String),

    // ============ Infrastructure Errors ============
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CacheError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a data error.
    #[must_use]
    pub fn data<T: Into<String>>(message: T) -> Self {
        Self::Data(message.into())
    }

    /// Creates a not found error for a key.
    #[must_use]
    pub fn not_found<T: Into<String>>(key: T) -> Self {
        Self::NotFound(key.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error is retriable.
    ///
    /// Only transport-level failures are worth another attempt. Admission
    /// rejections are never retried: a breaker trip mid-retry must abort the
    /// remaining attempts.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// Checks if this error should count as a failure for the circuit breaker.
    #[must_use]
    pub const fn should_trip_circuit_breaker(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// Checks if the façade may answer this error from the fallback cache.
    #[must_use]
    pub const fn is_degradation(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::RateLimited | Self::CircuitOpen(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Data(format!("JSON serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_errors() {
        assert!(CacheError::transport("connection refused").is_retriable());
        assert!(CacheError::Timeout("deadline".to_string()).is_retriable());
    }

    #[test]
    fn test_non_retriable_errors() {
        assert!(!CacheError::data("WRONGTYPE").is_retriable());
        assert!(!CacheError::RateLimited.is_retriable());
        assert!(!CacheError::CircuitOpen("redis".to_string()).is_retriable());
        assert!(!CacheError::not_found("k").is_retriable());
    }

    #[test]
    fn test_circuit_breaker_errors() {
        assert!(CacheError::transport("io").should_trip_circuit_breaker());
        assert!(CacheError::Timeout("t".to_string()).should_trip_circuit_breaker());
        assert!(!CacheError::data("decode").should_trip_circuit_breaker());
        assert!(!CacheError::RateLimited.should_trip_circuit_breaker());
        assert!(!CacheError::CircuitOpen("redis".to_string()).should_trip_circuit_breaker());
    }

    #[test]
    fn test_degradation_errors() {
        assert!(CacheError::RateLimited.is_degradation());
        assert!(CacheError::CircuitOpen("redis".to_string()).is_degradation());
        assert!(CacheError::transport("io").is_degradation());
        assert!(!CacheError::data("decode").is_degradation());
        assert!(!CacheError::internal("bug").is_degradation());
    }

    #[test]
    fn test_json_error_is_data_error() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err = CacheError::from(err);
        assert!(matches!(err, CacheError::Data(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::CircuitOpen("redis-service".to_string());
        assert!(err.to_string().contains("redis-service"));
        assert_eq!(CacheError::RateLimited.to_string(), "Rate limit exceeded");
    }
}
