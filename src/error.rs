//! Construction-time validation errors.
//!
//! Runtime operations on stores and limiters are total: lookups return
//! `Option`, admission checks return `bool`, and nothing fails mid-flight.
//! The only rejectable inputs are configuration values, caught here when the
//! structure is built.

use std::time::Duration;
use thiserror::Error;

/// Errors produced when validating store or limiter configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The background sweep cannot be scheduled with a zero interval.
    #[error("sweep_interval must be > 0 (got {0:?})")]
    ZeroSweepInterval(Duration),

    /// Refill rate must be a positive, finite number of tokens per second.
    #[error("refill_rate must be finite and > 0 tokens/sec (got {provided})")]
    InvalidRefillRate {
        /// Value provided by caller.
        provided: f64,
    },

    /// Idle buckets need a non-zero window before reclamation.
    #[error("inactivity_window must be > 0 (got {0:?})")]
    ZeroInactivityWindow(Duration),
}
