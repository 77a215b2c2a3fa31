//! Circuit breaker implementation.
//!
//! Outcomes are recorded into a count-based sliding window. When the window
//! holds at least `minimum_calls` outcomes and the failure rate reaches the
//! threshold, the breaker opens. After `open_duration` the next admission
//! becomes the single half-open probe whose outcome closes or re-opens it.

mod window;

pub use window::{CallOutcome, OutcomeWindow};

use keystone_core::{CacheError, CacheResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counter of breaker state transitions, labelled by breaker and target state.
pub const BREAKER_TRANSITIONS_TOTAL: &str = "keystone_breaker_transitions_total";

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed - requests are allowed.
    Closed,
    /// Circuit is open - requests are rejected.
    Open,
    /// Circuit is half-open - a single probe is allowed.
    HalfOpen,
}

impl CircuitState {
    /// Returns the state name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate in `(0.0, 1.0]` at or above which the circuit opens.
    pub failure_rate_threshold: f64,
    /// Minimum number of buffered outcomes before the rate is evaluated.
    pub minimum_calls: usize,
    /// Number of most recent outcomes kept in the sliding window.
    pub window_size: usize,
    /// Duration to wait before transitioning from open to half-open.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            minimum_calls: 10,
            window_size: 100,
            open_duration: Duration::from_secs(30),
        }
    }
}

/// Point-in-time view of the breaker, for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Failure rate over the window.
    pub failure_rate: f64,
    /// Number of buffered outcomes.
    pub buffered_calls: usize,
    /// Number of buffered failures.
    pub failed_calls: usize,
    /// Number of buffered successes.
    pub successful_calls: usize,
    /// How many times the breaker has entered `Open`.
    pub times_opened: u64,
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Regular call while closed.
    Call,
    /// The half-open probe with the given generation.
    Probe(u64),
}

/// How a finished call is reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Success,
    Failure,
    /// The call neither succeeded nor failed in a way that says anything
    /// about remote health (data error, cancellation).
    Neutral,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: OutcomeWindow,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    probe_generation: u64,
    times_opened: u64,
}

/// Circuit breaker guarding one remote dependency.
///
/// All transitions happen under a single mutex, so exactly one concurrent
/// caller can become the half-open probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_rate_threshold = config.failure_rate_threshold,
            minimum_calls = config.minimum_calls,
            window_size = config.window_size,
            open_duration_ms = u64::try_from(config.open_duration.as_millis()).unwrap_or(u64::MAX),
            "Circuit breaker initialized"
        );

        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: OutcomeWindow::new(config.window_size),
                opened_at: None,
                probe_in_flight: false,
                probe_generation: 0,
                times_opened: 0,
            }),
            name,
            config,
        }
    }

    /// Creates a new circuit breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Returns the current state of the circuit breaker.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns the name of the circuit breaker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns a snapshot of state and window statistics.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_rate: inner.window.failure_rate(),
            buffered_calls: inner.window.len(),
            failed_calls: inner.window.failures(),
            successful_calls: inner.window.successes(),
            times_opened: inner.times_opened,
        }
    }

    /// Checks whether a call may proceed.
    ///
    /// In `Open`, the first call after `open_duration` moves the breaker to
    /// `HalfOpen` and is admitted as the probe. While the probe is
    /// outstanding every other call is rejected.
    pub fn allow(&self) -> bool {
        self.admit().is_some()
    }

    /// Records a successful call admitted by [`allow`](Self::allow).
    pub fn record_success(&self) {
        self.record_outcome(CallOutcome::success(Duration::ZERO));
    }

    /// Records a failed call admitted by [`allow`](Self::allow).
    pub fn record_failure(&self) {
        self.record_outcome(CallOutcome::failure(Duration::ZERO));
    }

    /// Records an outcome for a call admitted by [`allow`](Self::allow).
    ///
    /// In `HalfOpen` the outcome resolves the outstanding probe.
    pub fn record_outcome(&self, outcome: CallOutcome) {
        let mut inner = self.inner.lock();
        let admission = match inner.state {
            CircuitState::HalfOpen => Admission::Probe(inner.probe_generation),
            CircuitState::Closed | CircuitState::Open => Admission::Call,
        };
        let verdict = if outcome.success {
            Verdict::Success
        } else {
            Verdict::Failure
        };
        self.complete_locked(&mut inner, admission, verdict, outcome);
    }

    /// Executes a function with circuit breaker protection.
    ///
    /// Transport failures count against the breaker, successes count for
    /// it, and any other error (e.g. a data error) is neutral. If the
    /// returned future is dropped before completion the admission is
    /// released without recording an outcome.
    pub async fn call<F, Fut, T>(&self, f: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let Some(admission) = self.admit() else {
            debug!(breaker = %self.name, "Call rejected, circuit is open");
            return Err(CacheError::CircuitOpen(self.name.clone()));
        };

        let mut guard = AdmissionGuard {
            breaker: self,
            admission,
            finished: false,
        };

        let started = Instant::now();
        let result = f().await;
        let latency = started.elapsed();

        let verdict = match &result {
            Ok(_) => Verdict::Success,
            Err(e) if e.should_trip_circuit_breaker() => Verdict::Failure,
            Err(_) => Verdict::Neutral,
        };
        guard.finish(verdict, latency);

        result
    }

    /// Forces the breaker into `Open`. Repeated calls have no further effect.
    ///
    /// The regular open-duration timer applies afterwards.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            debug!(breaker = %self.name, "Force open ignored, already open");
            return;
        }
        self.open_locked(&mut inner);
        info!(breaker = %self.name, "Circuit breaker forced open");
    }

    /// Forces the breaker into `Closed` and resets the window.
    /// Repeated calls have no further effect.
    pub fn force_closed(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Closed {
            debug!(breaker = %self.name, "Force closed ignored, already closed");
            return;
        }
        self.close_locked(&mut inner);
        info!(breaker = %self.name, "Circuit breaker forced closed");
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission::Call),
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.open_duration);
                if !expired {
                    return None;
                }
                self.transition_locked(&mut inner, CircuitState::HalfOpen);
                Some(Self::issue_probe(&mut inner))
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    Some(Self::issue_probe(&mut inner))
                }
            }
        }
    }

    fn issue_probe(inner: &mut BreakerInner) -> Admission {
        inner.probe_in_flight = true;
        inner.probe_generation += 1;
        Admission::Probe(inner.probe_generation)
    }

    fn complete(&self, admission: Admission, verdict: Verdict, latency: Duration) {
        let outcome = CallOutcome {
            success: verdict != Verdict::Failure,
            timestamp: Instant::now(),
            latency,
        };
        let mut inner = self.inner.lock();
        self.complete_locked(&mut inner, admission, verdict, outcome);
    }

    fn complete_locked(
        &self,
        inner: &mut BreakerInner,
        admission: Admission,
        verdict: Verdict,
        outcome: CallOutcome,
    ) {
        match inner.state {
            CircuitState::Closed => {
                if verdict == Verdict::Neutral {
                    return;
                }
                inner.window.push(outcome);
                let calls = inner.window.len();
                let rate = inner.window.failure_rate();
                if calls >= self.config.minimum_calls && rate >= self.config.failure_rate_threshold {
                    self.open_locked(inner);
                    warn!(
                        breaker = %self.name,
                        failure_rate = rate,
                        calls,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                let Admission::Probe(generation) = admission else {
                    // Admitted before the breaker opened; says nothing about recovery.
                    return;
                };
                if generation != inner.probe_generation {
                    return;
                }
                inner.probe_in_flight = false;
                match verdict {
                    Verdict::Success => {
                        self.close_locked(inner);
                        info!(breaker = %self.name, "Circuit breaker closed after successful probe");
                    }
                    Verdict::Failure => {
                        self.open_locked(inner);
                        warn!(breaker = %self.name, "Circuit breaker reopened after failed probe");
                    }
                    Verdict::Neutral => {
                        debug!(breaker = %self.name, "Half-open probe released without outcome");
                    }
                }
            }
            CircuitState::Open => {
                debug!(breaker = %self.name, "Ignoring outcome recorded while open");
            }
        }
    }

    fn open_locked(&self, inner: &mut BreakerInner) {
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
        inner.times_opened += 1;
        self.transition_locked(inner, CircuitState::Open);
    }

    fn close_locked(&self, inner: &mut BreakerInner) {
        inner.window.clear();
        inner.opened_at = None;
        inner.probe_in_flight = false;
        self.transition_locked(inner, CircuitState::Closed);
    }

    fn transition_locked(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        debug!(breaker = %self.name, %from, %to, "Circuit breaker transition");
        metrics::counter!(
            BREAKER_TRANSITIONS_TOTAL,
            "breaker" => self.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);
    }
}

/// Releases an admission if the guarded call never reports back.
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    finished: bool,
}

impl AdmissionGuard<'_> {
    fn finish(&mut self, verdict: Verdict, latency: Duration) {
        self.finished = true;
        self.breaker.complete(self.admission, verdict, latency);
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker
                .complete(self.admission, Verdict::Neutral, Duration::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    fn config(open_duration: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_rate_threshold: 0.5,
            minimum_calls: 10,
            window_size: 100,
            open_duration,
        }
    }

    async fn fail(cb: &CircuitBreaker) -> CacheResult<i32> {
        cb.call(|| async { Err(CacheError::transport("connection refused")) })
            .await
    }

    async fn succeed(cb: &CircuitBreaker) -> CacheResult<i32> {
        cb.call(|| async { Ok(42) }).await
    }

    #[tokio::test]
    async fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.name(), "test");
        assert!(cb.allow());
    }

    #[tokio::test]
    async fn test_circuit_breaker_successful_call_returns_value() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(succeed(&cb).await.unwrap(), 42);
        assert_eq!(cb.snapshot().successful_calls, 1);
    }

    #[tokio::test]
    async fn test_circuit_breaker_stays_closed_below_minimum_calls() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(30)));
        for _ in 0..9 {
            assert!(matches!(fail(&cb).await, Err(CacheError::Transport(_))));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failed_calls, 9);
    }

    #[tokio::test]
    async fn test_circuit_breaker_trips_at_exact_threshold() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(30)));
        for _ in 0..5 {
            succeed(&cb).await.unwrap();
        }
        for _ in 0..4 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        // 5 failures out of 10 is exactly 50%
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_circuit_breaker_below_threshold_stays_closed() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(30)));
        for _ in 0..6 {
            succeed(&cb).await.unwrap();
        }
        for _ in 0..4 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!((cb.snapshot().failure_rate - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_exactly_once() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(30)));
        let mut rejected = 0;
        for _ in 0..25 {
            if let Err(CacheError::CircuitOpen(_)) = fail(&cb).await {
                rejected += 1;
            }
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().times_opened, 1);
        assert_eq!(rejected, 15);
    }

    #[tokio::test]
    async fn test_circuit_breaker_rejects_until_open_duration_elapses() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(100)));
        cb.force_open();

        assert!(matches!(succeed(&cb).await, Err(CacheError::CircuitOpen(_))));
        assert!(!cb.allow());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Probe outstanding
        assert!(!cb.allow());
    }

    #[tokio::test]
    async fn test_half_open_probe_success_closes_and_resets_window() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(20)));
        for _ in 0..10 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(succeed(&cb).await.unwrap(), 42);

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.buffered_calls, 0);
    }

    #[tokio::test]
    async fn test_half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(20)));
        cb.force_open();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(matches!(fail(&cb).await, Err(CacheError::Transport(_))));
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().times_opened, 2);

        // Timer restarted
        assert!(!cb.allow());
    }

    #[test]
    fn test_half_open_admits_exactly_one_concurrent_probe() {
        let cb = Arc::new(CircuitBreaker::new("test", config(Duration::from_millis(10))));
        cb.force_open();
        std::thread::sleep(Duration::from_millis(30));

        let threads = 32;
        let barrier = Arc::new(Barrier::new(threads));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let cb = Arc::clone(&cb);
                let barrier = Arc::clone(&barrier);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    barrier.wait();
                    if cb.allow() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_data_errors_do_not_count() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(30)));
        for _ in 0..20 {
            let result: CacheResult<i32> = cb.call(|| async { Err(CacheError::data("WRONGTYPE")) }).await;
            assert!(matches!(result, Err(CacheError::Data(_))));
        }
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.buffered_calls, 0);
    }

    #[tokio::test]
    async fn test_data_error_releases_half_open_probe() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(10)));
        cb.force_open();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let result: CacheResult<i32> = cb.call(|| async { Err(CacheError::data("decode")) }).await;
        assert!(matches!(result, Err(CacheError::Data(_))));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // A new probe can be admitted
        assert_eq!(succeed(&cb).await.unwrap(), 42);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_probe_is_released() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(10)));
        cb.force_open();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let pending = cb.call(|| std::future::pending::<CacheResult<i32>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow());
    }

    #[tokio::test]
    async fn test_force_open_is_idempotent() {
        let cb = CircuitBreaker::with_defaults("test");
        succeed(&cb).await.unwrap();

        cb.force_open();
        cb.force_open();
        cb.force_open();

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.times_opened, 1);
        assert_eq!(snapshot.buffered_calls, 1);
    }

    #[tokio::test]
    async fn test_force_closed_resets_window() {
        let cb = CircuitBreaker::new("test", config(Duration::from_secs(30)));
        for _ in 0..10 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        cb.force_closed();
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.buffered_calls, 0);
        assert!(cb.allow());
    }

    #[tokio::test]
    async fn test_manual_allow_and_record() {
        let cb = CircuitBreaker::new("test", config(Duration::from_millis(10)));
        for _ in 0..10 {
            assert!(cb.allow());
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cb.allow());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_outcome_recorded_while_open_is_ignored() {
        let cb = CircuitBreaker::with_defaults("test");
        cb.force_open();
        cb.record_failure();
        cb.record_success();
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.buffered_calls, 0);
    }

    #[test]
    fn test_circuit_breaker_config_default() {
        let config = CircuitBreakerConfig::default();
        assert!((config.failure_rate_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.minimum_calls, 10);
        assert_eq!(config.window_size, 100);
        assert_eq!(config.open_duration, Duration::from_secs(30));
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
    }
}
