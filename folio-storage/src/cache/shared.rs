//! Shared network tier (L2) contract and an in-process reference store.
//!
//! The production L2 is an existing key/value service reached through a
//! client crate that implements [`SharedStore`]. Values cross the boundary
//! as JSON documents; every method is async and may fail with a tier error
//! (`CacheError::TierUnavailable` / `CacheError::Timeout`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use folio_core::{FolioResult, KeyPattern};
use serde::Serialize;
use serde_json::Value;

/// One entry of a batch write.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedEntry {
    pub key: String,
    pub value: Value,
    /// TTL for this entry; `None` leaves expiry to the store's default.
    pub ttl: Option<Duration>,
}

impl SharedEntry {
    pub fn new(key: impl Into<String>, value: Value, ttl: Option<Duration>) -> Self {
        Self {
            key: key.into(),
            value,
            ttl,
        }
    }
}

/// Statistics reported by the shared tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SharedStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently stored.
    pub size: u64,
    /// Number of entries dropped by the store (expiry or memory pressure).
    pub evictions: u64,
}

impl SharedStats {
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

/// Shared cache tier used by every process in the deployment.
///
/// The store provides its own per-key atomicity; callers need no locking.
///
/// # Patterns
///
/// `delete_pattern` receives the same syntax [`KeyPattern`] parses: `*`
/// matches any run of characters, everything else is literal.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Get a value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> FolioResult<Option<Value>>;

    /// Store a value, overwriting any previous one.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> FolioResult<bool>;

    /// Delete a key. Returns true if it existed.
    async fn delete(&self, key: &str) -> FolioResult<bool>;

    /// Delete every key matching `pattern`. Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> FolioResult<u64>;

    /// Store many values in one round trip.
    async fn mset(&self, entries: Vec<SharedEntry>) -> FolioResult<()>;

    /// Get tier statistics.
    async fn stats(&self) -> FolioResult<SharedStats>;

    /// Remove every entry.
    async fn clear(&self) -> FolioResult<()>;
}

#[derive(Debug, Clone)]
struct SharedSlot {
    value: Value,
    expires_at: Option<Instant>,
}

impl SharedSlot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Process-local [`SharedStore`] for development and tests.
///
/// Uses tokio::sync::RwLock for safe async access. Entries without a TTL
/// fall back to `default_ttl` when one is configured.
#[derive(Debug, Default)]
pub struct InMemorySharedStore {
    slots: tokio::sync::RwLock<HashMap<String, SharedSlot>>,
    default_ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InMemorySharedStore {
    /// Create an empty store whose entries never expire unless given a TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store applying `ttl` to writes that carry none.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Returns true if `key` holds a live value. Does not touch counters.
    pub async fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.slots
            .read()
            .await
            .get(key)
            .is_some_and(|slot| slot.is_live(now))
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .slots
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn slot(&self, value: Value, ttl: Option<Duration>) -> SharedSlot {
        SharedSlot {
            value,
            expires_at: ttl
                .or(self.default_ttl)
                .and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }
}

#[async_trait]
impl SharedStore for InMemorySharedStore {
    async fn get(&self, key: &str) -> FolioResult<Option<Value>> {
        let now = Instant::now();
        {
            let slots = self.slots.read().await;
            match slots.get(key) {
                Some(slot) if slot.is_live(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(slot.value.clone()));
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        }

        // Expired: remove unless a writer replaced it in between.
        let mut slots = self.slots.write().await;
        if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            slots.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> FolioResult<bool> {
        let slot = self.slot(value, ttl);
        self.slots.write().await.insert(key.to_string(), slot);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> FolioResult<bool> {
        Ok(self.slots.write().await.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> FolioResult<u64> {
        let pattern = KeyPattern::parse(pattern);
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|key, _| !pattern.matches(key));
        Ok((before - slots.len()) as u64)
    }

    async fn mset(&self, entries: Vec<SharedEntry>) -> FolioResult<()> {
        let prepared: Vec<(String, SharedSlot)> = entries
            .into_iter()
            .map(|entry| {
                let slot = self.slot(entry.value, entry.ttl);
                (entry.key, slot)
            })
            .collect();
        self.slots.write().await.extend(prepared);
        Ok(())
    }

    async fn stats(&self) -> FolioResult<SharedStats> {
        let now = Instant::now();
        let size = self
            .slots
            .read()
            .await
            .values()
            .filter(|slot| slot.is_live(now))
            .count() as u64;
        Ok(SharedStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size,
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }

    async fn clear(&self) -> FolioResult<()> {
        self.slots.write().await.clear();
        Ok(())
    }
}
