//! Count-based sliding window of call outcomes.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of a single call that passed through the breaker.
#[derive(Debug, Clone, Copy)]
pub struct CallOutcome {
    /// Whether the call succeeded.
    pub success: bool,
    /// When the call completed.
    pub timestamp: Instant,
    /// How long the call took.
    pub latency: Duration,
}

impl CallOutcome {
    /// A successful outcome completed now.
    #[must_use]
    pub fn success(latency: Duration) -> Self {
        Self {
            success: true,
            timestamp: Instant::now(),
            latency,
        }
    }

    /// A failed outcome completed now.
    #[must_use]
    pub fn failure(latency: Duration) -> Self {
        Self {
            success: false,
            timestamp: Instant::now(),
            latency,
        }
    }
}

/// Fixed-size window holding the last `capacity` outcomes.
///
/// The failure count is maintained incrementally so that computing the
/// failure rate never walks the buffer.
#[derive(Debug)]
pub struct OutcomeWindow {
    capacity: usize,
    outcomes: VecDeque<CallOutcome>,
    failures: usize,
}

impl OutcomeWindow {
    /// Creates an empty window. A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            outcomes: VecDeque::with_capacity(capacity),
            failures: 0,
        }
    }

    /// Appends an outcome, evicting the oldest one when full.
    pub fn push(&mut self, outcome: CallOutcome) {
        if self.outcomes.len() == self.capacity {
            if let Some(evicted) = self.outcomes.pop_front() {
                if !evicted.success {
                    self.failures -= 1;
                }
            }
        }
        if !outcome.success {
            self.failures += 1;
        }
        self.outcomes.push_back(outcome);
    }

    /// Number of buffered outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the window holds no outcomes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of buffered failures.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Number of buffered successes.
    #[must_use]
    pub fn successes(&self) -> usize {
        self.outcomes.len() - self.failures
    }

    /// Failure rate in `[0.0, 1.0]`; `0.0` for an empty window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures as f64 / self.outcomes.len() as f64
    }

    /// Mean latency of the buffered calls.
    #[must_use]
    pub fn mean_latency(&self) -> Duration {
        let Ok(count) = u32::try_from(self.outcomes.len()) else {
            return Duration::ZERO;
        };
        if count == 0 {
            return Duration::ZERO;
        }
        self.outcomes.iter().map(|o| o.latency).sum::<Duration>() / count
    }

    /// Drops every buffered outcome.
    pub fn clear(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}
