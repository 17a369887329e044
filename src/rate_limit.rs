//! Per-identity token-bucket rate limiting.
//!
//! One [`TokenBucket`] per client identity (typically the peer IP), held
//! inside a sliding-window [`TtlMap`] so the bucket's lifetime tracks the
//! client's last request rather than its first: an actively abusive client is
//! never forgotten mid-abuse, while a genuinely idle client's state is
//! reclaimed after the inactivity window. Identities are of unbounded
//! cardinality, so without that reclamation the bucket map grows without
//! bound.

use crate::clock::{Clock, MonotonicClock};
use crate::error::ConfigError;
use crate::store::{ExpiryPolicy, Ttl, TtlMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Classic token bucket with continuous refill.
///
/// Tokens accrue at `refill_rate` per second up to `capacity`; each admitted
/// action consumes one. State is interior-mutable behind a mutex, so clones of
/// a shared `Arc<TokenBucket>` all observe and affect the same bucket.
#[derive(Debug)]
pub struct TokenBucket {
    /// Tokens per millisecond of elapsed clock time.
    refill_per_milli: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill_millis: u64,
}

impl TokenBucket {
    /// Create a bucket holding `capacity` tokens as of `now_millis`.
    pub fn full(refill_rate: f64, capacity: u32, now_millis: u64) -> Self {
        let capacity = f64::from(capacity);
        Self {
            refill_per_milli: refill_rate / 1_000.0,
            capacity,
            state: Mutex::new(BucketState { tokens: capacity, last_refill_millis: now_millis }),
        }
    }

    /// Refill for the elapsed time, then take one token if available.
    ///
    /// The token count and refill timestamp are updated in place whether or
    /// not the acquisition succeeds.
    pub fn try_acquire(&self, now_millis: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now_millis.saturating_sub(state.last_refill_millis);
        state.tokens = (state.tokens + elapsed as f64 * self.refill_per_milli).min(self.capacity);
        state.last_refill_millis = now_millis;
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token-bucket limiter keyed by client identity.
///
/// Owns one [`ExpiryPolicy::SlidingWindow`] store of buckets; bucket creation,
/// reuse, and retirement are fully delegated to that store's entry lifecycle.
/// [`allow`](RateLimiter::allow) never fails: a zero-capacity limiter simply
/// denies everything, which is a legal (if unusual) configuration.
///
/// # Example
///
/// ```rust
/// use perishable::RateLimiter;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let limiter = RateLimiter::new(5.0, 2, Duration::from_secs(300)).unwrap();
///     assert!(limiter.allow("203.0.113.7"));
/// }
/// ```
pub struct RateLimiter {
    buckets: TtlMap<String, Arc<TokenBucket>>,
    refill_rate: f64,
    capacity: u32,
    inactivity_window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter sweeping idle buckets at the inactivity window.
    ///
    /// Errors if `refill_rate` is not a positive finite number or
    /// `inactivity_window` is zero. `capacity` of zero is accepted and means
    /// deny-everything.
    pub fn new(
        refill_rate: f64,
        capacity: u32,
        inactivity_window: Duration,
    ) -> Result<Self, ConfigError> {
        Self::with_sweep_interval(refill_rate, capacity, inactivity_window, inactivity_window)
    }

    /// Like [`new`](RateLimiter::new) but with the sweep cadence decoupled
    /// from the inactivity window, for deployments that prefer a rare, cheap
    /// backstop over prompt reclamation.
    pub fn with_sweep_interval(
        refill_rate: f64,
        capacity: u32,
        inactivity_window: Duration,
        sweep_interval: Duration,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(
            refill_rate,
            capacity,
            inactivity_window,
            sweep_interval,
            Arc::new(MonotonicClock::default()),
        )
    }

    /// Fully injected constructor; the clock drives both bucket refill and
    /// entry expiry, so tests can advance one fake clock for both.
    pub fn with_clock(
        refill_rate: f64,
        capacity: u32,
        inactivity_window: Duration,
        sweep_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(ConfigError::InvalidRefillRate { provided: refill_rate });
        }
        if inactivity_window.is_zero() {
            return Err(ConfigError::ZeroInactivityWindow(inactivity_window));
        }
        let buckets =
            TtlMap::with_clock(ExpiryPolicy::SlidingWindow, sweep_interval, Arc::clone(&clock))?;
        Ok(Self { buckets, refill_rate, capacity, inactivity_window, clock })
    }

    /// Decide whether one request from `identity` is admitted.
    ///
    /// First contact builds a bucket at full capacity, takes the first token
    /// from it, and stores it under the inactivity window; the sliding store
    /// then renews the bucket's lifetime on every later call, admitted or
    /// not. Two racing first requests may each build a bucket; the later
    /// insert wins and at most one token of accounting is lost.
    pub fn allow(&self, identity: &str) -> bool {
        let now = self.clock.now_millis();
        match self.buckets.get(identity) {
            Some(bucket) => bucket.try_acquire(now),
            None => {
                let bucket = Arc::new(TokenBucket::full(self.refill_rate, self.capacity, now));
                let admitted = bucket.try_acquire(now);
                debug!(
                    target: "perishable::rate_limit",
                    identity,
                    capacity = self.capacity,
                    "created rate-limit bucket on first contact"
                );
                self.buckets.insert(
                    identity.to_owned(),
                    bucket,
                    Ttl::After(self.inactivity_window),
                );
                admitted
            }
        }
    }

    /// Tokens refilled per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Maximum burst size.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// How long an idle identity's bucket survives before reclamation.
    pub fn inactivity_window(&self) -> Duration {
        self.inactivity_window
    }

    /// Cadence at which the bucket store sweeps idle state.
    pub fn sweep_interval(&self) -> Duration {
        self.buckets.sweep_interval()
    }

    /// Approximate number of identities currently holding a bucket.
    pub fn tracked_identities(&self) -> usize {
        self.buckets.len()
    }

    /// Stop the bucket store's background sweep task.
    pub fn close(&self) {
        self.buckets.close();
    }
}
