//! Circuit breaker state machine.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// The current state of a circuit breaker.
///
/// The consecutive-failure counter travels with the state, so it is reset
/// exactly when the circuit transitions to [`CircuitState::Closed`] and is
/// still readable while the circuit is open or probing.
#[derive(Debug, Clone, Copy)]
pub enum CircuitState {
    /// Circuit is closed; calls pass through normally.
    Closed {
        /// Number of consecutive failures observed since the last reset.
        failure_count: u32,
    },

    /// Circuit is open; calls are rejected without being attempted.
    Open {
        /// Consecutive failures recorded up to and including the one that
        /// opened (or last re-opened) the circuit.
        failure_count: u32,
        /// When the most recent failure opened or re-stamped the circuit.
        opened_at: Instant,
        /// When the circuit becomes eligible for half-open probing.
        until: Instant,
    },

    /// Circuit is half-open; a limited number of trial calls are admitted.
    HalfOpen {
        /// Consecutive failures carried over from the open period.
        failure_count: u32,
        /// Number of trial calls admitted since entering half-open.
        trial_count: u32,
    },
}

impl CircuitState {
    /// Creates a new closed state with a clean failure counter.
    pub fn closed() -> Self {
        Self::Closed { failure_count: 0 }
    }

    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen { .. })
    }

    /// Returns the consecutive-failure counter.
    pub fn failure_count(&self) -> u32 {
        match self {
            Self::Closed { failure_count }
            | Self::Open { failure_count, .. }
            | Self::HalfOpen { failure_count, .. } => *failure_count,
        }
    }

    /// Returns how long until the circuit will admit a probe, if it is open.
    pub fn retry_after(&self, now: Instant) -> Option<Duration> {
        match self {
            Self::Open { until, .. } => Some(until.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed { .. } => "closed",
            Self::Open { .. } => "open",
            Self::HalfOpen { .. } => "half_open",
        }
    }
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::closed()
    }
}

/// A point-in-time, read-only view of a breaker for monitoring and logging.
///
/// Snapshots are detached from the breaker; holding one does not block
/// callers and cannot mutate breaker state.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Name of the current state (`"closed"`, `"open"`, or `"half_open"`).
    pub state: &'static str,
    /// Consecutive-failure counter.
    pub failure_count: u32,
    /// Time remaining until the circuit will admit a probe, if it is open.
    pub retry_after: Option<Duration>,
}

/// Metrics about circuit breaker behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Total number of calls, including rejected ones.
    pub total_calls: u64,
    /// Number of calls that were attempted and succeeded.
    pub successes: u64,
    /// Number of calls that were attempted and failed.
    pub failures: u64,
    /// Number of calls rejected without being attempted.
    pub rejected: u64,
    /// Number of times the circuit has opened.
    pub times_opened: u64,
    /// Number of times the circuit has returned to closed.
    pub times_closed: u64,
}

impl BreakerMetrics {
    /// Creates new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful call.
    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.successes += 1;
    }

    /// Records a failed call.
    pub fn record_failure(&mut self) {
        self.total_calls += 1;
        self.failures += 1;
    }

    /// Records a rejected call.
    pub fn record_rejected(&mut self) {
        self.total_calls += 1;
        self.rejected += 1;
    }

    /// Records that the circuit opened.
    pub fn record_opened(&mut self) {
        self.times_opened += 1;
    }

    /// Records that the circuit closed.
    pub fn record_closed(&mut self) {
        self.times_closed += 1;
    }

    /// Returns the success rate among attempted calls and rejections (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.successes as f64 / self.total_calls as f64
    }

    /// Returns the failure rate among attempted calls and rejections (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failures as f64 / self.total_calls as f64
    }
}
