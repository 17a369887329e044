//! Pre-configured stores and limiters for the common account-service caches.
//!
//! These mirror the tunings an authentication service typically wants:
//! short-lived single-use codes in fixed-deadline stores, and a per-IP
//! limiter whose idle state is reclaimed after a few minutes. The sweep runs
//! rarely; it only exists to reclaim keys that are written and then never
//! read (abandoned verification codes, one-off crawlers), and the lazy reap
//! covers everything else.

use crate::error::ConfigError;
use crate::rate_limit::RateLimiter;
use crate::store::{ExpiryPolicy, TtlMap};
use std::time::Duration;

/// Burst size for the per-IP limiter.
pub const DEFAULT_LIMITER_CAPACITY: u32 = 2;
/// Tokens per second for the per-IP limiter.
pub const DEFAULT_LIMITER_REFILL_RATE: f64 = 5.0;
/// Idle time before an IP's bucket is reclaimed.
pub const DEFAULT_LIMITER_INACTIVITY_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Cadence of the sweep backstop across all presets.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);
/// How long a user has to use an emailed verification or reset code.
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// Per-IP request limiter: burst of 2, 5 tokens/sec, idle state reclaimed
/// after 5 minutes, swept every 2 hours.
pub fn ip_rate_limiter() -> Result<RateLimiter, ConfigError> {
    RateLimiter::with_sweep_interval(
        DEFAULT_LIMITER_REFILL_RATE,
        DEFAULT_LIMITER_CAPACITY,
        DEFAULT_LIMITER_INACTIVITY_WINDOW,
        DEFAULT_SWEEP_INTERVAL,
    )
}

/// Fixed-deadline store for pending email-verification codes.
///
/// Callers insert with [`DEFAULT_CODE_TTL`] (or their own); codes are
/// single-use, so the consumer removes them on success and expiry covers the
/// abandoned ones.
pub fn verification_cache<V: Send + 'static>() -> Result<TtlMap<String, V>, ConfigError> {
    TtlMap::new(ExpiryPolicy::FixedDeadline, DEFAULT_SWEEP_INTERVAL)
}

/// Fixed-deadline store for pending password-reset codes.
pub fn reset_code_cache<V: Send + 'static>() -> Result<TtlMap<String, V>, ConfigError> {
    TtlMap::new(ExpiryPolicy::FixedDeadline, DEFAULT_SWEEP_INTERVAL)
}
