//! Circuit breaker configuration.

use crate::error::ConfigError;
use std::time::Duration;

/// Configuration for a [`CircuitBreaker`](crate::CircuitBreaker).
///
/// All three bounds must be positive; [`CircuitBreaker::new`](crate::CircuitBreaker::new)
/// rejects anything else with a [`ConfigError`]. The configuration is
/// immutable once the breaker is constructed.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Number of consecutive failures that trip the circuit.
    pub max_failures: u32,

    /// How long the circuit stays open before admitting a probe.
    pub reset_timeout: Duration,

    /// Maximum number of trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

impl BreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the consecutive-failure threshold.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Sets the open-state cooldown.
    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    /// Sets the maximum number of half-open trial calls.
    pub fn with_half_open_max_calls(mut self, half_open_max_calls: u32) -> Self {
        self.half_open_max_calls = half_open_max_calls;
        self
    }

    /// Creates a configuration that trips early and recovers cautiously.
    ///
    /// Lower failure threshold (3), longer cooldown (60 seconds), and a
    /// single half-open trial.
    pub fn strict() -> Self {
        Self {
            max_failures: 3,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }

    /// Creates a configuration that favors availability.
    ///
    /// Higher failure threshold (10), shorter cooldown (10 seconds), and
    /// more half-open trials.
    pub fn high_availability() -> Self {
        Self {
            max_failures: 10,
            reset_timeout: Duration::from_secs(10),
            half_open_max_calls: 3,
        }
    }

    /// Checks that every bound is positive.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first violated bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_failures == 0 {
            return Err(ConfigError::MaxFailures {
                value: self.max_failures,
            });
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::ResetTimeout);
        }
        if self.half_open_max_calls == 0 {
            return Err(ConfigError::HalfOpenMaxCalls {
                value: self.half_open_max_calls,
            });
        }
        Ok(())
    }
}
