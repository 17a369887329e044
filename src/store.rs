//! Concurrent TTL map with lazy reap and a background sweep task.
//!
//! [`TtlMap`] is the storage primitive the rest of the crate builds on: a
//! mutex-guarded map from key to `(value, deadline)` with one of two expiry
//! policies chosen at construction. Expired entries become unobservable the
//! moment their deadline passes; memory is reclaimed either by the read that
//! discovers the expiry (lazy reap) or by a periodic sweep task that exists
//! for keys written once and never read again.
//!
//! Every access, including the read path, goes through the same mutex as
//! writes and the sweep. Reading the underlying map without that exclusion
//! while another task inserts or removes keys is a data race, not merely a
//! stale read.

use crate::clock::{Clock, MonotonicClock};
use crate::error::ConfigError;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// How entry deadlines behave once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Deadline is fixed at insert time and never extended by reads.
    ///
    /// Suits single-use, bounded-lifetime state such as email-verification
    /// or password-reset codes.
    FixedDeadline,
    /// Every successful read pushes the deadline to `now + ttl`
    /// (last-access expiry).
    ///
    /// Suits per-client state that should survive exactly as long as the
    /// client stays active, such as rate-limit buckets.
    SlidingWindow,
}

/// Lifetime requested for an inserted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expire `Duration` after the insert (or, under
    /// [`ExpiryPolicy::SlidingWindow`], after the last successful read).
    After(Duration),
    /// Never expire; the entry outlives every sweep until removed explicitly.
    Never,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    /// Absolute deadline in clock millis; `None` never expires.
    deadline: Option<u64>,
    /// Set only under the sliding policy; millis added on each read.
    renewal_window: Option<u64>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: u64) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

struct Shared<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V> Shared<K, V> {
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        // A poisoned lock means a caller's `Clone` panicked mid-read; the map
        // itself is still structurally sound, so keep serving and sweeping.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep(&self) {
        let now = self.clock.now_millis();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(
                target: "perishable::store",
                removed,
                resident = entries.len(),
                "sweep removed expired entries"
            );
        }
    }
}

/// Concurrent map whose entries expire.
///
/// Construction spawns one sweep task on the ambient Tokio runtime (so a
/// `TtlMap` must be built from within a runtime); the task stops when the map
/// is [`close`](TtlMap::close)d or dropped. Independent `TtlMap` instances
/// share no state.
///
/// Readers receive a clone of the stored value; no caller ever holds a
/// reference into the map.
///
/// # Example
///
/// ```rust
/// use perishable::{ExpiryPolicy, Ttl, TtlMap};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let codes: TtlMap<String, String> =
///         TtlMap::new(ExpiryPolicy::FixedDeadline, Duration::from_secs(120)).unwrap();
///     codes.insert(
///         "verify-3f9a".into(),
///         "user@example.com".into(),
///         Ttl::After(Duration::from_secs(600)),
///     );
///     assert_eq!(codes.get("verify-3f9a").as_deref(), Some("user@example.com"));
/// }
/// ```
pub struct TtlMap<K, V> {
    shared: Arc<Shared<K, V>>,
    sweep_interval: Duration,
    sweeper: JoinHandle<()>,
}

impl<K, V> TtlMap<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    /// Create a map with the given policy and start its sweep task.
    ///
    /// Errors if `sweep_interval` is zero; there is no meaningful cadence at
    /// which to run the backstop.
    pub fn new(policy: ExpiryPolicy, sweep_interval: Duration) -> Result<Self, ConfigError> {
        Self::with_clock(policy, sweep_interval, Arc::new(MonotonicClock::default()))
    }

    /// Like [`new`](TtlMap::new) but with an injected clock, useful for
    /// deterministic expiry tests.
    pub fn with_clock(
        policy: ExpiryPolicy,
        sweep_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval(sweep_interval));
        }
        let shared = Arc::new(Shared { entries: Mutex::new(HashMap::new()), policy, clock });
        let sweeper = Self::spawn_sweeper(Arc::clone(&shared), sweep_interval);
        Ok(Self { shared, sweep_interval, sweeper })
    }

    fn spawn_sweeper(shared: Arc<Shared<K, V>>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            loop {
                ticks.tick().await;
                shared.sweep();
            }
        })
    }

    /// Insert or overwrite the entry for `key`.
    ///
    /// Overwriting fully replaces the previous entry, deadline included; there
    /// is no merge. Under [`ExpiryPolicy::SlidingWindow`] a finite `ttl` also
    /// becomes the renewal window applied on each subsequent read.
    pub fn insert(&self, key: K, value: V, ttl: Ttl) {
        let now = self.shared.clock.now_millis();
        let (deadline, renewal_window) = match ttl {
            Ttl::Never => (None, None),
            Ttl::After(duration) => {
                let millis = duration_millis(duration);
                let renewal = match self.shared.policy {
                    ExpiryPolicy::SlidingWindow => Some(millis),
                    ExpiryPolicy::FixedDeadline => None,
                };
                (Some(now.saturating_add(millis)), renewal)
            }
        };
        let mut entries = self.shared.lock_entries();
        entries.insert(key, Entry { value, deadline, renewal_window });
    }

    /// Look up `key`, returning a clone of its value while the entry is live.
    ///
    /// A read that finds the deadline already passed deletes the entry on the
    /// spot (lazy reap) and reports absence. Under
    /// [`ExpiryPolicy::SlidingWindow`] a successful read renews the deadline
    /// to `now + ttl` before returning. Both the reap and the renewal happen
    /// under the same lock as writes and the sweep, so one logical read is
    /// atomic with respect to a concurrent removal of the same key.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        let now = self.shared.clock.now_millis();
        let mut entries = self.shared.lock_entries();
        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired(now) {
                if let Some(window) = entry.renewal_window {
                    entry.deadline = Some(now.saturating_add(window));
                }
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }
        entries.remove(key);
        trace!(target: "perishable::store", "lazily reaped expired entry");
        None
    }

    /// Remove the entry for `key` if present.
    pub fn remove<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut entries = self.shared.lock_entries();
        entries.remove(key);
    }

    /// Approximate resident entry count.
    ///
    /// May include expired entries the sweep has not visited yet; diagnostics
    /// only, not a correctness-critical observation.
    pub fn len(&self) -> usize {
        self.shared.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Policy this map was built with.
    pub fn policy(&self) -> ExpiryPolicy {
        self.shared.policy
    }

    /// Cadence of the background sweep task.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Stop the background sweep task.
    ///
    /// Entries remain readable afterwards (lazy reap still applies); only the
    /// periodic backstop stops. Dropping the map has the same effect.
    pub fn close(&self) {
        self.sweeper.abort();
    }

    #[cfg(test)]
    fn sweep_now(&self) {
        self.shared.sweep();
    }
}

impl<K, V> Drop for TtlMap<K, V> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn sliding(clock: &ManualClock) -> TtlMap<String, u32> {
        TtlMap::with_clock(
            ExpiryPolicy::SlidingWindow,
            Duration::from_secs(3600),
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    fn fixed(clock: &ManualClock) -> TtlMap<String, u32> {
        TtlMap::with_clock(
            ExpiryPolicy::FixedDeadline,
            Duration::from_secs(3600),
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn get_returns_live_entry() {
        let clock = ManualClock::new();
        let map = fixed(&clock);
        map.insert("a".into(), 1, Ttl::After(Duration::from_secs(1)));
        assert_eq!(map.get("a"), Some(1));
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_reaped_by_the_read_that_finds_it() {
        let clock = ManualClock::new();
        let map = fixed(&clock);
        map.insert("a".into(), 1, Ttl::After(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(1));

        assert_eq!(map.get("a"), None);
        // Gone before any sweep tick, via the lazy reap.
        assert_eq!(map.len(), 0);
    }

    #[tokio::test]
    async fn sliding_reads_keep_an_entry_alive() {
        let clock = ManualClock::new();
        let map = sliding(&clock);
        map.insert("a".into(), 1, Ttl::After(Duration::from_secs(1)));

        for _ in 0..5 {
            clock.advance(Duration::from_millis(600));
            assert_eq!(map.get("a"), Some(1), "reads within the window must renew it");
        }

        // Stop reading: gone one full window after the last successful read.
        clock.advance(Duration::from_millis(1001));
        assert_eq!(map.get("a"), None);
    }

    #[tokio::test]
    async fn fixed_reads_never_extend_the_deadline() {
        let clock = ManualClock::new();
        let map = fixed(&clock);
        map.insert("a".into(), 1, Ttl::After(Duration::from_secs(1)));

        clock.advance(Duration::from_millis(600));
        assert_eq!(map.get("a"), Some(1));

        clock.advance(Duration::from_millis(600));
        assert_eq!(map.get("a"), None, "deadline is insert-time + ttl regardless of reads");
    }

    #[tokio::test]
    async fn never_expiring_entries_survive_time_and_sweeps() {
        let clock = ManualClock::new();
        let map = sliding(&clock);
        map.insert("pinned".into(), 7, Ttl::Never);

        clock.advance(Duration::from_secs(10_000_000));
        map.sweep_now();

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("pinned"), Some(7));
    }

    #[tokio::test]
    async fn sweep_removes_only_past_deadline_entries() {
        let clock = ManualClock::new();
        let map = fixed(&clock);
        map.insert("short".into(), 1, Ttl::After(Duration::from_secs(1)));
        map.insert("long".into(), 2, Ttl::After(Duration::from_secs(60)));
        map.insert("forever".into(), 3, Ttl::Never);

        clock.advance(Duration::from_secs(2));
        map.sweep_now();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("short"), None);
        assert_eq!(map.get("long"), Some(2));
        assert_eq!(map.get("forever"), Some(3));
    }

    #[tokio::test]
    async fn overwrite_fully_replaces_the_entry() {
        let clock = ManualClock::new();
        let map = fixed(&clock);
        map.insert("a".into(), 1, Ttl::After(Duration::from_secs(1)));
        map.insert("a".into(), 2, Ttl::Never);

        clock.advance(Duration::from_secs(100));
        assert_eq!(map.get("a"), Some(2), "second insert's lifetime wins");
    }

    #[tokio::test]
    async fn remove_is_unconditional_and_idempotent() {
        let clock = ManualClock::new();
        let map = fixed(&clock);
        map.insert("a".into(), 1, Ttl::Never);
        map.remove("a");
        map.remove("a");
        assert_eq!(map.get("a"), None);
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn zero_sweep_interval_is_rejected() {
        let result: Result<TtlMap<String, u32>, _> =
            TtlMap::new(ExpiryPolicy::FixedDeadline, Duration::ZERO);
        assert_eq!(result.err(), Some(ConfigError::ZeroSweepInterval(Duration::ZERO)));
    }

    #[tokio::test]
    async fn zero_ttl_means_expired_on_next_observation() {
        let clock = ManualClock::new();
        let map = fixed(&clock);
        map.insert("a".into(), 1, Ttl::After(Duration::ZERO));
        assert_eq!(map.get("a"), None);
    }

    #[tokio::test]
    async fn policy_accessor_reports_construction_choice() {
        let clock = ManualClock::new();
        assert_eq!(sliding(&clock).policy(), ExpiryPolicy::SlidingWindow);
        assert_eq!(fixed(&clock).policy(), ExpiryPolicy::FixedDeadline);
    }

    #[tokio::test]
    async fn sweep_interval_accessor_reports_construction_choice() {
        let map: TtlMap<String, u32> =
            TtlMap::new(ExpiryPolicy::FixedDeadline, Duration::from_secs(120)).unwrap();
        assert_eq!(map.sweep_interval(), Duration::from_secs(120));
    }
}
