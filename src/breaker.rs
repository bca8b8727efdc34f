//! Circuit breaker implementation.

use crate::config::BreakerConfig;
use crate::error::{BreakerError, ConfigError, RejectReason};
use crate::state::{BreakerMetrics, BreakerSnapshot, CircuitState};

use std::fmt;
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// A circuit breaker guarding a single unreliable dependency.
///
/// The breaker decides, for each call, whether the wrapped operation may
/// run, and updates its own state from the outcome. It never retries and
/// never swallows a failure.
///
/// # States
///
/// - **Closed**: Normal operation. Calls pass through, consecutive failures
///   are counted; the counter is cleared by any success.
/// - **Open**: The dependency is assumed down. Calls are rejected immediately
///   until the reset timeout elapses.
/// - **Half-Open**: Probing. A bounded number of trial calls are admitted;
///   a single success closes the circuit, a single failure reopens it.
///
/// # Ownership
///
/// One breaker instance guards one logical dependency. Construct it once at
/// the composition root and share it (for example via `Arc`) with every call
/// site that talks to that dependency. Independent dependencies get
/// independent instances.
///
/// # Example
///
/// ```
/// use fusebox::{BreakerError, CircuitBreaker};
///
/// let breaker = CircuitBreaker::with_defaults();
///
/// match breaker.execute(|| "pong".parse::<String>()) {
///     Ok(reply) => println!("dependency answered: {reply}"),
///     Err(BreakerError::Rejected { reason, .. }) => println!("blocked: {reason}"),
///     Err(BreakerError::Operation { source }) => println!("dependency failed: {source}"),
/// }
/// ```
pub struct CircuitBreaker {
    /// Name of the guarded dependency, used in log events.
    name: String,
    /// Configuration, immutable after construction.
    config: BreakerConfig,
    /// Current state of the circuit.
    state: RwLock<CircuitState>,
    /// Metrics.
    metrics: RwLock<BreakerMetrics>,
}

/// Outcome of a rejected admission check, before it is typed with the
/// operation's error.
struct Rejection {
    reason: RejectReason,
    retry_after: Option<Duration>,
}

impl Rejection {
    fn into_error<E>(self) -> BreakerError<E> {
        BreakerError::Rejected {
            reason: self.reason,
            retry_after: self.retry_after,
        }
    }
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any configured bound is non-positive.
    pub fn new(config: BreakerConfig) -> Result<Self, ConfigError> {
        Self::named("breaker", config)
    }

    /// Creates a new circuit breaker named after the dependency it guards.
    ///
    /// The name shows up in log events, which matters once an application
    /// runs one breaker per dependency.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any configured bound is non-positive.
    pub fn named(name: impl Into<String>, config: BreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::closed()),
            metrics: RwLock::new(BreakerMetrics::new()),
        })
    }

    /// Creates a new circuit breaker with the default configuration.
    pub fn with_defaults() -> Self {
        Self {
            name: "breaker".to_string(),
            config: BreakerConfig::default(),
            state: RwLock::new(CircuitState::closed()),
            metrics: RwLock::new(BreakerMetrics::new()),
        }
    }

    /// Returns the name of the guarded dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the current state of the circuit.
    pub fn state(&self) -> CircuitState {
        *self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a copy of the current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        self.metrics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns a read-only snapshot of the breaker for monitoring.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state();
        BreakerSnapshot {
            state: state.name(),
            failure_count: state.failure_count(),
            retry_after: state.retry_after(Instant::now()),
        }
    }

    /// Returns the circuit to the closed state and wipes metrics.
    ///
    /// This is an operator action; normal recovery happens through the
    /// half-open probing cycle.
    pub fn reset(&self) {
        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = CircuitState::closed();
        *self
            .metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = BreakerMetrics::new();
    }

    /// Runs `operation` under the breaker's protection.
    ///
    /// The admission decision and the outcome update each hold the state
    /// lock briefly; the operation itself runs with no lock held, so a slow
    /// call does not serialize unrelated callers.
    ///
    /// # Errors
    ///
    /// - [`BreakerError::Rejected`] if the circuit blocked the call; the
    ///   operation was not invoked.
    /// - [`BreakerError::Operation`] if the operation ran and failed; the
    ///   failure has been recorded against the circuit.
    pub fn execute<T, E, F>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Err(rejection) = self.admit() {
            return Err(rejection.into_error());
        }

        match operation() {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(source) => {
                self.record_failure();
                Err(BreakerError::Operation { source })
            }
        }
    }

    /// Runs an async `operation` under the breaker's protection.
    ///
    /// Same contract as [`execute`](Self::execute); the future is awaited
    /// with no lock held.
    ///
    /// # Errors
    ///
    /// - [`BreakerError::Rejected`] if the circuit blocked the call.
    /// - [`BreakerError::Operation`] if the operation ran and failed.
    pub async fn execute_async<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(rejection) = self.admit() {
            return Err(rejection.into_error());
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(source) => {
                self.record_failure();
                Err(BreakerError::Operation { source })
            }
        }
    }

    /// Decides whether a call may proceed.
    ///
    /// The open-to-half-open rollover and the half-open admission count
    /// share one lock acquisition, so racing callers can neither reset the
    /// trial counter twice nor push it past the cap.
    fn admit(&self) -> Result<(), Rejection> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        match *state {
            CircuitState::Closed { .. } => Ok(()),

            CircuitState::Open {
                failure_count,
                until,
                ..
            } => {
                if now >= until {
                    tracing::info!(
                        breaker = %self.name,
                        "reset timeout elapsed; transitioning to half-open"
                    );
                    // The call that rolls the circuit over is itself the
                    // first trial.
                    *state = CircuitState::HalfOpen {
                        failure_count,
                        trial_count: 1,
                    };
                    Ok(())
                } else {
                    let retry_after = until - now;
                    tracing::warn!(
                        breaker = %self.name,
                        retry_after = ?retry_after,
                        "circuit open; call blocked"
                    );
                    self.metrics
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .record_rejected();
                    Err(Rejection {
                        reason: RejectReason::Open,
                        retry_after: Some(retry_after),
                    })
                }
            }

            CircuitState::HalfOpen {
                failure_count,
                trial_count,
            } => {
                if trial_count < self.config.half_open_max_calls {
                    *state = CircuitState::HalfOpen {
                        failure_count,
                        trial_count: trial_count + 1,
                    };
                    Ok(())
                } else {
                    tracing::warn!(
                        breaker = %self.name,
                        trial_count,
                        "half-open trial limit exceeded; call blocked"
                    );
                    self.metrics
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .record_rejected();
                    Err(Rejection {
                        reason: RejectReason::HalfOpenLimit,
                        retry_after: None,
                    })
                }
            }
        }
    }

    /// Records a successful call.
    ///
    /// Any success resets the circuit, whatever the state at completion
    /// time. In particular a single half-open trial success closes it.
    fn record_success(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let was_closed = state.is_closed();
        if !was_closed {
            tracing::info!(breaker = %self.name, "call succeeded; closing circuit");
        }
        *state = CircuitState::closed();

        let mut metrics = self
            .metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        metrics.record_success();
        if !was_closed {
            metrics.record_closed();
        }
    }

    /// Records a failed call.
    fn record_failure(&self) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut metrics = self
            .metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        metrics.record_failure();

        let now = Instant::now();
        let until = now + self.config.reset_timeout;

        match *state {
            CircuitState::Closed { failure_count } => {
                let failures = failure_count + 1;
                if failures >= self.config.max_failures {
                    tracing::warn!(
                        breaker = %self.name,
                        failures,
                        "failure threshold reached; opening circuit"
                    );
                    *state = CircuitState::Open {
                        failure_count: failures,
                        opened_at: now,
                        until,
                    };
                    metrics.record_opened();
                } else {
                    *state = CircuitState::Closed {
                        failure_count: failures,
                    };
                }
            }

            CircuitState::HalfOpen { failure_count, .. } => {
                // Any trial failure reopens the circuit, regardless of the
                // threshold.
                tracing::warn!(breaker = %self.name, "trial call failed; reopening circuit");
                *state = CircuitState::Open {
                    failure_count: failure_count + 1,
                    opened_at: now,
                    until,
                };
                metrics.record_opened();
            }

            CircuitState::Open { failure_count, .. } => {
                // An admitted call can finish after a concurrent trial
                // failure already reopened the circuit; restart the cooldown
                // clock from this later failure.
                *state = CircuitState::Open {
                    failure_count: failure_count + 1,
                    opened_at: now,
                    until,
                };
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")
    }

    fn test_breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            BreakerConfig::new()
                .with_max_failures(3)
                .with_reset_timeout(Duration::from_millis(50))
                .with_half_open_max_calls(2),
        )
        .unwrap()
    }

    fn trip(breaker: &CircuitBreaker) {
        for _ in 0..breaker.config().max_failures {
            let _ = breaker.execute(|| Err::<(), _>(refused()));
        }
        assert!(breaker.state().is_open());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = CircuitBreaker::new(BreakerConfig::new().with_max_failures(0));
        assert!(matches!(result, Err(ConfigError::MaxFailures { value: 0 })));

        let result = CircuitBreaker::new(BreakerConfig::new().with_reset_timeout(Duration::ZERO));
        assert!(matches!(result, Err(ConfigError::ResetTimeout)));

        let result = CircuitBreaker::new(BreakerConfig::new().with_half_open_max_calls(0));
        assert!(matches!(
            result,
            Err(ConfigError::HalfOpenMaxCalls { value: 0 })
        ));
    }

    #[test]
    fn test_passes_through_when_closed() {
        let breaker = test_breaker();

        let value = breaker.execute(|| Ok::<_, io::Error>(42)).unwrap();
        assert_eq!(value, 42);
        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics().successes, 1);
    }

    #[test]
    fn test_repeated_success_is_idempotent() {
        let breaker = test_breaker();

        for _ in 0..10 {
            breaker.execute(|| Ok::<_, io::Error>(())).unwrap();
            assert!(breaker.state().is_closed());
            assert_eq!(breaker.state().failure_count(), 0);
        }
    }

    #[test]
    fn test_success_clears_failure_streak() {
        let breaker = test_breaker();

        for _ in 0..2 {
            let _ = breaker.execute(|| Err::<(), _>(refused()));
        }
        assert_eq!(breaker.state().failure_count(), 2);

        breaker.execute(|| Ok::<_, io::Error>(())).unwrap();
        assert_eq!(breaker.state().failure_count(), 0);

        // The earlier failures no longer count toward the threshold.
        for _ in 0..2 {
            let _ = breaker.execute(|| Err::<(), _>(refused()));
        }
        assert!(breaker.state().is_closed());

        let _ = breaker.execute(|| Err::<(), _>(refused()));
        assert!(breaker.state().is_open());
    }

    #[test]
    fn test_opens_after_max_failures() {
        let breaker = test_breaker();

        for i in 1..=3u32 {
            let err = breaker.execute(|| Err::<(), _>(refused())).unwrap_err();
            assert!(err.is_operation());
            if i < 3 {
                assert!(breaker.state().is_closed());
            }
        }

        assert!(breaker.state().is_open());
        assert_eq!(breaker.state().failure_count(), 3);
        assert_eq!(breaker.metrics().times_opened, 1);
    }

    #[test]
    fn test_rejects_without_invoking_when_open() {
        let breaker = test_breaker();
        trip(&breaker);

        let invocations = AtomicU32::new(0);
        let err = breaker
            .execute(|| {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, io::Error>(())
            })
            .unwrap_err();

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(err.reject_reason(), Some(RejectReason::Open));
        assert!(err.retry_after().is_some());
        assert_eq!(breaker.metrics().rejected, 1);
    }

    #[test]
    fn test_half_open_success_closes_circuit() {
        let breaker = test_breaker();
        trip(&breaker);

        thread::sleep(Duration::from_millis(60));

        // First call after the cooldown is attempted, and a single success
        // closes the circuit.
        breaker.execute(|| Ok::<_, io::Error>(())).unwrap();
        assert!(breaker.state().is_closed());
        assert_eq!(breaker.state().failure_count(), 0);
        assert_eq!(breaker.metrics().times_closed, 1);
    }

    #[test]
    fn test_half_open_failure_reopens_circuit() {
        let breaker = test_breaker();
        trip(&breaker);

        thread::sleep(Duration::from_millis(60));

        let err = breaker.execute(|| Err::<(), _>(refused())).unwrap_err();
        assert!(err.is_operation());
        assert!(breaker.state().is_open());
        assert_eq!(breaker.metrics().times_opened, 2);

        // The trial failure restarted the cooldown clock.
        let err = breaker.execute(|| Ok::<_, io::Error>(())).unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::Open));

        thread::sleep(Duration::from_millis(60));
        breaker.execute(|| Ok::<_, io::Error>(())).unwrap();
        assert!(breaker.state().is_closed());
    }

    #[test]
    fn test_half_open_admits_at_most_max_calls() {
        let breaker = Arc::new(
            CircuitBreaker::new(
                BreakerConfig::new()
                    .with_max_failures(1)
                    .with_reset_timeout(Duration::from_millis(20))
                    .with_half_open_max_calls(2),
            )
            .unwrap(),
        );
        trip(&breaker);
        thread::sleep(Duration::from_millis(30));

        let invocations = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(5));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                let invocations = Arc::clone(&invocations);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    breaker.execute(|| {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        // Keep the trial slots occupied while the other
                        // callers attempt admission.
                        thread::sleep(Duration::from_millis(100));
                        Ok::<_, io::Error>(())
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let admitted = results.iter().filter(|r| r.is_ok()).count();
        let rejected: Vec<_> = results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .map(|e| e.reject_reason())
            .collect();

        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        assert_eq!(admitted, 2);
        assert_eq!(rejected.len(), 3);
        assert!(rejected
            .iter()
            .all(|r| *r == Some(RejectReason::HalfOpenLimit)));
    }

    #[test]
    fn test_full_lifecycle() {
        let breaker = test_breaker();

        // Two healthy calls, then three consecutive failures.
        breaker.execute(|| Ok::<_, io::Error>(())).unwrap();
        breaker.execute(|| Ok::<_, io::Error>(())).unwrap();
        for _ in 0..3 {
            let _ = breaker.execute(|| Err::<(), _>(refused()));
        }
        assert!(breaker.state().is_open());

        // Blocked while the cooldown runs.
        let err = breaker.execute(|| Ok::<_, io::Error>(())).unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::Open));

        // The trial after the cooldown fails, so the circuit reopens and
        // stays blocked for another full cooldown.
        thread::sleep(Duration::from_millis(60));
        let err = breaker.execute(|| Err::<(), _>(refused())).unwrap_err();
        assert!(err.is_operation());
        assert!(breaker.state().is_open());

        let err = breaker.execute(|| Ok::<_, io::Error>(())).unwrap_err();
        assert!(err.is_rejected());

        thread::sleep(Duration::from_millis(60));
        breaker.execute(|| Ok::<_, io::Error>(())).unwrap();
        assert!(breaker.state().is_closed());
    }

    #[test]
    fn test_snapshot_reports_retry_after() {
        let breaker = CircuitBreaker::named(
            "payments-api",
            BreakerConfig::new()
                .with_max_failures(3)
                .with_reset_timeout(Duration::from_secs(30))
                .with_half_open_max_calls(2),
        )
        .unwrap();
        assert_eq!(breaker.name(), "payments-api");

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, "closed");
        assert!(snapshot.retry_after.is_none());

        trip(&breaker);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, "open");
        assert_eq!(snapshot.failure_count, 3);
        let retry_after = snapshot.retry_after.unwrap();
        assert!(retry_after > Duration::ZERO);
        assert!(retry_after <= Duration::from_secs(30));
    }

    #[test]
    fn test_reset_returns_to_closed() {
        let breaker = test_breaker();
        trip(&breaker);

        breaker.reset();
        assert!(breaker.state().is_closed());
        assert_eq!(breaker.metrics().total_calls, 0);

        breaker.execute(|| Ok::<_, io::Error>(())).unwrap();
    }

    #[tokio::test]
    async fn test_execute_async_passes_through() {
        let breaker = test_breaker();

        let value = breaker
            .execute_async(|| async { Ok::<_, io::Error>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(breaker.state().is_closed());
    }

    #[tokio::test]
    async fn test_execute_async_trip_and_recover() {
        let breaker = test_breaker();

        for _ in 0..3 {
            let _ = breaker
                .execute_async(|| async { Err::<(), _>(refused()) })
                .await;
        }
        assert!(breaker.state().is_open());

        let err = breaker
            .execute_async(|| async { Ok::<_, io::Error>(()) })
            .await
            .unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::Open));

        tokio::time::sleep(Duration::from_millis(60)).await;

        breaker
            .execute_async(|| async { Ok::<_, io::Error>(()) })
            .await
            .unwrap();
        assert!(breaker.state().is_closed());
    }
}
