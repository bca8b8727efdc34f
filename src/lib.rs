//! # Fusebox
//!
//! A concurrency-safe circuit breaker for guarding unreliable operations.
//!
//! ## Overview
//!
//! A circuit breaker sits in front of a fallible operation, typically a
//! remote call, and tracks consecutive failures. Once a threshold is
//! crossed it stops invoking the operation for a cooldown period, then
//! cautiously probes recovery with a bounded number of trial calls. The
//! breaker is domain-agnostic: it wraps any closure returning `Result` and
//! reports, as distinct error kinds, whether a call was blocked or whether
//! it ran and failed.
//!
//! ## States
//!
//! - **Closed**: Normal operation; calls pass through, failures are counted.
//! - **Open**: Calls are rejected immediately until the reset timeout elapses.
//! - **Half-Open**: A limited number of trial calls probe for recovery.
//!
//! ## Quick Start
//!
//! ```rust
//! use fusebox::{BreakerConfig, BreakerError, CircuitBreaker};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), fusebox::ConfigError> {
//! let breaker = CircuitBreaker::named(
//!     "billing-api",
//!     BreakerConfig::new()
//!         .with_max_failures(3)
//!         .with_reset_timeout(Duration::from_secs(3))
//!         .with_half_open_max_calls(2),
//! )?;
//!
//! match breaker.execute(|| std::fs::read_to_string("/etc/hostname")) {
//!     Ok(reply) => println!("dependency answered: {}", reply.trim()),
//!     Err(BreakerError::Rejected { reason, .. }) => {
//!         // Never attempted; back off or use a fallback.
//!         println!("call blocked: {reason}");
//!     }
//!     Err(BreakerError::Operation { source }) => {
//!         // Attempted and failed; the breaker recorded it.
//!         println!("dependency failed: {source}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Ownership
//!
//! One breaker guards one logical dependency. Construct it once at the
//! application's composition root and hand it (by reference or `Arc`) to
//! every call site that talks to that dependency; give independent
//! dependencies independent breakers. There is no global registry.
//!
//! ## Architecture
//!
//! - **State**: The `Closed`/`Open`/`Half-Open` machine and its metrics.
//! - **Config**: Thresholds and timeouts, validated at construction.
//! - **Error**: Typed results distinguishing blocked from failed calls.
//! - **Breaker**: Admission, outcome recording, and the `execute` wrappers.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod breaker;
pub mod config;
pub mod error;
pub mod state;

// Re-export commonly used types at the crate root
pub use crate::breaker::CircuitBreaker;
pub use crate::config::BreakerConfig;
pub use crate::error::{BreakerError, ConfigError, RejectReason};
pub use crate::state::{BreakerMetrics, BreakerSnapshot, CircuitState};

/// Prelude module for convenient imports.
///
/// ```rust
/// use fusebox::prelude::*;
/// ```
pub mod prelude {
    pub use crate::breaker::CircuitBreaker;
    pub use crate::config::BreakerConfig;
    pub use crate::error::{BreakerError, ConfigError, RejectReason};
    pub use crate::state::{BreakerMetrics, BreakerSnapshot, CircuitState};
}
