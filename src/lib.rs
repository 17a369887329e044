#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Perishable
//!
//! Expiring in-memory primitives for async Rust: TTL maps with fixed and
//! sliding expiry, plus per-client token-bucket rate limiting built on top.
//!
//! ## Features
//!
//! - **[`TtlMap`]**: generic concurrent map with per-entry deadlines
//! - **Two expiry policies**: fixed deadline, or sliding last-access window
//! - **Lazy reap + background sweep**: expired entries vanish on read, and a
//!   periodic task reclaims the ones nobody reads again
//! - **[`RateLimiter`]**: per-identity token buckets whose lifetime is tied
//!   to client activity, so idle state is reclaimed instead of accumulating
//! - **Injectable [`Clock`]** for deterministic expiry tests
//!
//! ## Quick Start
//!
//! ```rust
//! use perishable::{ExpiryPolicy, RateLimiter, Ttl, TtlMap};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Short-lived, single-use tokens: fixed deadline, swept periodically.
//!     let pending: TtlMap<String, String> =
//!         TtlMap::new(ExpiryPolicy::FixedDeadline, Duration::from_secs(120)).unwrap();
//!     pending.insert(
//!         "reset-91c4".into(),
//!         "user@example.com".into(),
//!         Ttl::After(Duration::from_secs(600)),
//!     );
//!     assert!(pending.get("reset-91c4").is_some());
//!
//!     // One decision per inbound request.
//!     let limiter = RateLimiter::new(5.0, 10, Duration::from_secs(300)).unwrap();
//!     assert!(limiter.allow("203.0.113.7"));
//! }
//! ```

pub mod clock;
pub mod error;
pub mod presets;
pub mod rate_limit;
pub mod store;

// Re-exports
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::ConfigError;
pub use rate_limit::{RateLimiter, TokenBucket};
pub use store::{ExpiryPolicy, Ttl, TtlMap};
