//! Bounded in-process store (L1).
//!
//! Entries live in an insertion-ordered map. When the store is full and a
//! new key arrives, the earliest-inserted entry is evicted: an approximation
//! of LRU that needs no bookkeeping on reads. L1 is a backstop in front of
//! the shared tier, not a system of record.
//!
//! # Thread Safety
//!
//! All state sits behind one `Mutex`, so the check-capacity, evict, insert
//! sequence in [`MemoryStore::set`] is a single critical section. A poisoned
//! lock is recovered: no L1 operation can fail.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use folio_core::KeyPattern;
use indexmap::IndexMap;
use serde::Serialize;

/// Longest TTL L1 honours; longer requests are clamped.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A cached value and the instant it stops being served.
#[derive(Debug, Clone)]
struct MemoryEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> MemoryEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct Inner<V> {
    entries: IndexMap<String, MemoryEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Point-in-time view of L1 usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Entries currently held (expired entries not yet swept included).
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room for a new key.
    pub evictions: u64,
    /// Entries dropped because their TTL passed.
    pub expirations: u64,
}

impl MemoryStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Capacity-bounded key/value store with per-entry expiry.
#[derive(Debug)]
pub struct MemoryStore<V> {
    inner: Mutex<Inner<V>>,
    max_size: usize,
    default_ttl: Duration,
}

impl<V: Clone> MemoryStore<V> {
    /// Create a store holding at most `max_size` entries (at least one).
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::with_capacity(max_size),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            max_size,
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// TTL applied when `set` is called without one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live value. An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let lookup = inner.entries.get(key).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        match lookup {
            Some(Some(value)) => {
                inner.hits += 1;
                Some(value)
            }
            Some(None) => {
                inner.entries.shift_remove(key);
                inner.expirations += 1;
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite a value.
    ///
    /// A new key arriving at capacity first evicts exactly one entry, the
    /// earliest inserted. Overwriting keeps the key's original position.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl).min(MAX_TTL);
        let mut inner = self.lock();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            if let Some((evicted, _)) = inner.entries.shift_remove_index(0) {
                inner.evictions += 1;
                tracing::debug!(key = %evicted, "L1 evicted earliest entry");
            }
        }

        inner.entries.insert(key, MemoryEntry { value, expires_at });
        debug_assert!(inner.entries.len() <= self.max_size);
    }

    /// Remove a key. Returns true if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().entries.shift_remove(key).is_some()
    }

    /// Remove every key matching `pattern`. Returns the number removed.
    ///
    /// Linear in the number of entries, which the capacity bound keeps small.
    pub fn invalidate(&self, pattern: &KeyPattern) -> u64 {
        if !pattern.is_wildcard() {
            return u64::from(self.delete(pattern.as_str()));
        }

        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !pattern.matches(key));
        (before - inner.entries.len()) as u64
    }

    /// Returns true if `key` holds a live value. Does not touch counters.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> u64 {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = (before - inner.entries.len()) as u64;
        inner.expirations += removed;
        removed
    }

    /// Keys currently held, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries. Counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Snapshot of size and counters.
    pub fn stats(&self) -> MemoryStats {
        let inner = self.lock();
        MemoryStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Size never exceeds capacity, whatever the write sequence.
        #[test]
        fn prop_size_bounded(
            max in 1usize..8,
            keys in proptest::collection::vec("[a-e]{1,2}", 0..64),
        ) {
            let l1: MemoryStore<u32> = MemoryStore::new(max, Duration::from_secs(60));
            for (i, key) in keys.iter().enumerate() {
                l1.set(key.clone(), i as u32, None);
                prop_assert!(l1.len() <= max);
            }
        }

        /// The last write to a key is what a read observes.
        #[test]
        fn prop_last_write_wins(key in "[a-z]{1,8}", first in any::<u32>(), second in any::<u32>()) {
            let l1: MemoryStore<u32> = MemoryStore::new(4, Duration::from_secs(60));
            l1.set(key.clone(), first, None);
            l1.set(key.clone(), second, None);
            prop_assert_eq!(l1.get(&key), Some(second));
        }
    }
}
