//! Small keyed cache with millisecond-resolution expiry.
//!
//! Used to throttle the process probes behind the peer count. Entries are
//! never evicted: a stale entry is simply ignored by [`TtlCache::get`] until
//! the next [`TtlCache::set`] overwrites it, which is fine for the small,
//! fixed key space it serves.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Source of "now" for cache bookkeeping, in milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Monotonic wall clock anchored at construction time.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

struct Entry<V> {
    value: V,
    stored_at: u64,
}

/// Keyed store whose values are valid for a fixed time after being set.
///
/// Not synchronized; wrap it in a mutex when producers share it.
pub struct TtlCache<K, V> {
    ttl_millis: u64,
    entries: HashMap<K, Entry<V>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        TtlCache {
            ttl_millis: ttl.as_millis() as u64,
            entries: HashMap::new(),
            clock,
        }
    }

    /// Returns the value if it was set strictly less than the TTL ago.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_millis();
        self.entries
            .get(key)
            .filter(|entry| now.saturating_sub(entry.stored_at) < self.ttl_millis)
            .map(|entry| entry.value.clone())
    }

    /// Writes (or overwrites) `key` stamped with the current time.
    pub fn set(&mut self, key: K, value: V) {
        let stored_at = self.clock.now_millis();
        self.entries.insert(key, Entry { value, stored_at });
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
