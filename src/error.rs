//! Error types for the fusebox library.
//!
//! Callers must be able to tell "the breaker blocked this call" apart from
//! "the call ran and the dependency failed", since remediation differs:
//! back off versus investigate. [`BreakerError`] keeps the two as distinct
//! variants and never swallows the underlying cause.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a call was rejected without the operation being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The circuit is open and the reset timeout has not yet elapsed.
    Open,
    /// The circuit is half-open and all trial slots are taken.
    HalfOpenLimit,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "circuit is open"),
            Self::HalfOpenLimit => write!(f, "half-open trial limit exceeded"),
        }
    }
}

/// The error type returned by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute).
///
/// `E` is the wrapped operation's own error type.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The call was blocked by the breaker; the operation was never invoked.
    #[error("call blocked: {reason}")]
    Rejected {
        /// Why the call was blocked.
        reason: RejectReason,
        /// Time remaining until the circuit will admit a probe, if known.
        retry_after: Option<Duration>,
    },

    /// The operation was attempted and failed.
    ///
    /// The breaker recorded the failure; the payload is the operation's own
    /// error, unchanged.
    #[error("operation failed: {source}")]
    Operation {
        /// The underlying cause.
        #[source]
        source: E,
    },
}

impl<E> BreakerError<E> {
    /// Returns `true` if the call was blocked without being attempted.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns `true` if the operation ran and failed.
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation { .. })
    }

    /// Returns the rejection reason, if the call was blocked.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            Self::Operation { .. } => None,
        }
    }

    /// Returns the suggested wait before retrying, if the circuit is open.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Rejected { retry_after, .. } => *retry_after,
            Self::Operation { .. } => None,
        }
    }

    /// Consumes the error, returning the operation's own error if there is one.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation { source } => Some(source),
            Self::Rejected { .. } => None,
        }
    }
}

/// Error raised when a breaker is constructed with out-of-range bounds.
///
/// Construction is the only place configuration is checked; a breaker that
/// exists is always validly configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_failures` must be at least 1.
    #[error("max_failures must be positive (got {value})")]
    MaxFailures {
        /// The rejected value.
        value: u32,
    },

    /// `reset_timeout` must be non-zero.
    #[error("reset_timeout must be non-zero")]
    ResetTimeout,

    /// `half_open_max_calls` must be at least 1.
    #[error("half_open_max_calls must be positive (got {value})")]
    HalfOpenMaxCalls {
        /// The rejected value.
        value: u32,
    },
}
