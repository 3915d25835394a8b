//! Tiered read-through/write-through cache.
//!
//! Composes the in-process store (L1), a shared store (L2) and an optional
//! caller-supplied loader (L3) behind one API:
//!
//! ```text
//! get ──→ L1 ──hit──→ value
//!          │miss
//!          ▼
//!         L2 ──hit──→ backfill L1 ──→ value
//!          │miss
//!          ▼
//!        loader ──Some──→ write L1 + L2 ──→ value
//!          │None
//!          ▼
//!         None
//! ```
//!
//! There is no per-key locking: concurrent misses on one key may all run
//! the loader and all write back. An abandoned `get` does not cancel the L2
//! call or loader already in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_core::{
    CacheConfig, CacheError, DomainChange, FolioResult, KeyPattern, L2ErrorPolicy, TtlPolicy,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::memory::{MemoryStats, MemoryStore};
use super::shared::{SharedEntry, SharedStats, SharedStore};
use super::writeback::{DetachedWrites, FlushReport};

/// Per-call switches for tier access and TTL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Bypass L1 for this call.
    pub skip_l1: bool,
    /// Bypass L2 for this call.
    pub skip_l2: bool,
    /// TTL for writes made by this call, instead of the category default.
    pub ttl: Option<Duration>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bypass L1.
    pub fn skip_l1(mut self) -> Self {
        self.skip_l1 = true;
        self
    }

    /// Bypass L2.
    pub fn skip_l2(mut self) -> Self {
        self.skip_l2 = true;
        self
    }

    /// Write with an explicit TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Keys removed by one purge, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeCount {
    pub l1: u64,
    pub l2: u64,
}

impl PurgeCount {
    /// Distinct keys purged, assuming L1 mirrors a subset of L2.
    pub fn keys(&self) -> u64 {
        self.l1.max(self.l2)
    }

    /// Returns true if either tier removed something.
    pub fn any(&self) -> bool {
        self.l1 > 0 || self.l2 > 0
    }
}

/// Result of applying an invalidation rule's pattern list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// Keys purged across all patterns.
    pub invalidated: u64,
    /// Entries removed from L1.
    pub l1: u64,
    /// Entries removed from L2.
    pub l2: u64,
}

/// A value to preload into both tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct WarmEntry {
    pub key: String,
    pub value: Value,
    pub ttl: Option<Duration>,
}

impl WarmEntry {
    /// Encode a typed value for warming.
    pub fn new<T: Serialize>(
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> FolioResult<Self> {
        let key = key.into();
        let value = encode(&key, value)?;
        Ok(Self { key, value, ttl })
    }
}

/// Usage of both tiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieredStats {
    pub l1: MemoryStats,
    /// `None` when L2 failed to answer and the cache degrades L2 failures.
    pub l2: Option<SharedStats>,
}

/// Slow-path source consulted when both tiers miss.
#[async_trait]
pub trait Loader<T>: Send + Sync {
    /// Load the authoritative value for `key`, or `None` if it does not exist.
    async fn load(&self, key: &str) -> FolioResult<Option<T>>;
}

/// Read-through/write-through cache over an in-process and a shared tier.
///
/// Construct one per process in the application's composition root and
/// hand out clones; clones share both tiers and the detached write queue.
///
/// # Example
///
/// ```ignore
/// let cache = TieredCache::new(Arc::new(redis_store), CacheConfig::from_env())?;
///
/// let user: Option<User> = cache
///     .get_or_load(&build_key("user", [id]), &CacheOptions::new(), || db.user(id))
///     .await?;
///
/// // After a mutation
/// cache.apply(&DomainChange::UserUpdated { user_id: id.into() }).await?;
/// ```
pub struct TieredCache<S>
where
    S: SharedStore,
{
    /// In-process tier, values kept as shared JSON documents.
    l1: Arc<MemoryStore<Arc<Value>>>,
    /// Shared tier.
    l2: Arc<S>,
    ttl_policy: Arc<TtlPolicy>,
    detached: Arc<DetachedWrites>,
    config: CacheConfig,
}

impl<S> TieredCache<S>
where
    S: SharedStore + 'static,
{
    /// Create a tiered cache over `l2`.
    ///
    /// # Errors
    ///
    /// Returns `FolioError::Config` if the configuration is invalid.
    pub fn new(l2: Arc<S>, config: CacheConfig) -> FolioResult<Self> {
        config.validate()?;
        Ok(Self {
            l1: Arc::new(MemoryStore::new(config.l1_max_size, config.l1_default_ttl)),
            l2,
            ttl_policy: Arc::new(config.ttl_policy()),
            detached: Arc::new(DetachedWrites::new()),
            config,
        })
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the in-process tier.
    pub fn l1(&self) -> &MemoryStore<Arc<Value>> {
        &self.l1
    }

    /// Get a reference to the shared tier.
    pub fn l2(&self) -> &S {
        &self.l2
    }

    /// Get the TTL policy.
    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl_policy
    }

    /// Look a key up in L1, then L2. No loader.
    pub async fn get<T>(&self, key: &str, opts: &CacheOptions) -> FolioResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.lookup(key, opts).await? {
            Some(value) => decode(key, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Look a key up in L1, then L2, then call `loader`.
    ///
    /// A `Some` from the loader is written through both tiers (subject to
    /// `opts`) before it is returned. `None` is returned as-is and never
    /// cached. Loader errors propagate unchanged; nothing is retried.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &str,
        opts: &CacheOptions,
        loader: F,
    ) -> FolioResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FolioResult<Option<T>>>,
    {
        if let Some(value) = self.lookup(key, opts).await? {
            return decode(key, &value).map(Some);
        }

        let loaded = loader().await?;
        match loaded {
            Some(value) => {
                tracing::debug!(key = %key, "Loader produced value, writing through");
                self.set(key, &value, opts).await?;
                Ok(Some(value))
            }
            None => {
                tracing::debug!(key = %key, "Loader found nothing");
                Ok(None)
            }
        }
    }

    /// [`get_or_load`](Self::get_or_load) with a [`Loader`] implementation.
    pub async fn get_with<T, L>(
        &self,
        key: &str,
        opts: &CacheOptions,
        loader: &L,
    ) -> FolioResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        L: Loader<T> + ?Sized,
    {
        self.get_or_load(key, opts, || loader.load(key)).await
    }

    /// Write a value to L1 and L2, overwriting prior state.
    ///
    /// L1 writes cannot fail; L2 failures follow the configured policy.
    pub async fn set<T>(&self, key: &str, value: &T, opts: &CacheOptions) -> FolioResult<()>
    where
        T: Serialize + ?Sized,
    {
        let value = Arc::new(encode(key, value)?);
        let ttl = self.resolve_ttl(key, opts);

        if !opts.skip_l1 {
            self.l1.set(key, Arc::clone(&value), Some(ttl));
        }

        if !opts.skip_l2 {
            let written = self
                .l2
                .set(key, Value::clone(&value), Some(ttl))
                .await
                .map(|_| ());
            self.absorb_l2("set", key, written, ())?;
        }

        Ok(())
    }

    /// Write L1 now and L2 in the background.
    ///
    /// The L2 write keeps running if every clone of the cache is dropped or
    /// a pending [`flush`](Self::flush) is abandoned. It has no delivery
    /// guarantee if the process exits first; await `flush` before shutdown
    /// when it matters.
    ///
    /// # Errors
    ///
    /// Fails on serialization errors. Outside a tokio runtime the L2 write
    /// cannot start; that is reported as an L2 tier failure (after L1 has
    /// been written) and follows the configured policy.
    pub fn set_detached<T>(&self, key: &str, value: &T, opts: &CacheOptions) -> FolioResult<()>
    where
        T: Serialize + ?Sized,
    {
        let value = Arc::new(encode(key, value)?);
        let ttl = self.resolve_ttl(key, opts);

        if !opts.skip_l1 {
            self.l1.set(key, Arc::clone(&value), Some(ttl));
        }

        if opts.skip_l2 {
            return Ok(());
        }

        let l2 = Arc::clone(&self.l2);
        let owned_key = key.to_string();
        let document = Value::clone(&value);
        let spawned = self.detached.spawn(key.to_string(), async move {
            l2.set(&owned_key, document, Some(ttl)).await.map(|_| ())
        });
        self.absorb_l2("set_detached", key, spawned, ())
    }

    /// Wait for all detached writes and report how they went.
    pub async fn flush(&self) -> FlushReport {
        self.detached.flush().await
    }

    /// Remove a key from both tiers. Returns true if either tier held it.
    pub async fn delete(&self, key: &str) -> FolioResult<bool> {
        self.delete_counted(key).await.map(|count| count.any())
    }

    /// Remove every key matching `pattern` from both tiers.
    ///
    /// L1 is scanned linearly; L2 uses its native pattern delete. The tiers
    /// are purged independently, not atomically. A pattern without `*`
    /// removes exactly one key.
    pub async fn invalidate(&self, pattern: &str) -> FolioResult<PurgeCount> {
        let parsed = KeyPattern::parse(pattern);
        if !parsed.is_wildcard() {
            return self.delete_counted(pattern).await;
        }

        let l1 = self.l1.invalidate(&parsed);
        let l2 = self.l2.delete_pattern(pattern).await;
        let l2 = self.absorb_l2("delete_pattern", pattern, l2, 0)?;

        tracing::debug!(pattern = %pattern, l1, l2, "Invalidated pattern");
        Ok(PurgeCount { l1, l2 })
    }

    /// Apply an invalidation rule's pattern list in order.
    ///
    /// Exact patterns become single deletes, wildcard patterns fan out.
    pub async fn invalidate_patterns<I, P>(&self, patterns: I) -> FolioResult<InvalidationReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut report = InvalidationReport::default();
        for pattern in patterns {
            let count = self.invalidate(pattern.as_ref()).await?;
            report.invalidated += count.keys();
            report.l1 += count.l1;
            report.l2 += count.l2;
        }

        tracing::debug!(
            invalidated = report.invalidated,
            l1 = report.l1,
            l2 = report.l2,
            "Applied invalidation patterns"
        );
        Ok(report)
    }

    /// Purge everything a domain change makes stale.
    pub async fn apply(&self, change: &DomainChange) -> FolioResult<InvalidationReport> {
        self.invalidate_patterns(change.patterns()).await
    }

    /// Preload both tiers. Returns the number of entries written.
    ///
    /// L1 is filled entry by entry; L2 receives one batch write.
    pub async fn warm(&self, entries: Vec<WarmEntry>) -> FolioResult<usize> {
        let count = entries.len();
        if count == 0 {
            return Ok(0);
        }

        let batch: Vec<SharedEntry> = entries
            .into_iter()
            .map(|entry| {
                let ttl = entry.ttl.unwrap_or_else(|| self.ttl_policy.ttl_for_key(&entry.key));
                self.l1
                    .set(entry.key.as_str(), Arc::new(entry.value.clone()), Some(ttl));
                SharedEntry::new(entry.key, entry.value, Some(ttl))
            })
            .collect();

        let written = self.l2.mset(batch).await;
        self.absorb_l2("mset", "<warm batch>", written, ())?;

        tracing::debug!(count, "Warmed cache");
        Ok(count)
    }

    /// Report usage of both tiers.
    pub async fn stats(&self) -> FolioResult<TieredStats> {
        let l2 = self.l2.stats().await.map(Some);
        Ok(TieredStats {
            l1: self.l1.stats(),
            l2: self.absorb_l2("stats", "", l2, None)?,
        })
    }

    /// Empty both tiers. For test teardown or an emergency flush.
    pub async fn clear(&self) -> FolioResult<()> {
        self.l1.clear();
        let cleared = self.l2.clear().await;
        self.absorb_l2("clear", "", cleared, ())?;
        tracing::debug!("Cleared both cache tiers");
        Ok(())
    }

    async fn lookup(&self, key: &str, opts: &CacheOptions) -> FolioResult<Option<Arc<Value>>> {
        if !opts.skip_l1 {
            if let Some(value) = self.l1.get(key) {
                tracing::debug!(key = %key, tier = "L1", "Cache hit");
                return Ok(Some(value));
            }
        }

        if !opts.skip_l2 {
            let found = self.l2.get(key).await;
            if let Some(value) = self.absorb_l2("get", key, found, None)? {
                tracing::debug!(key = %key, tier = "L2", "Cache hit");
                let value = Arc::new(value);
                if !opts.skip_l1 {
                    self.l1
                        .set(key, Arc::clone(&value), Some(self.resolve_ttl(key, opts)));
                }
                return Ok(Some(value));
            }
        }

        tracing::debug!(key = %key, "Cache miss");
        Ok(None)
    }

    async fn delete_counted(&self, key: &str) -> FolioResult<PurgeCount> {
        let l1 = u64::from(self.l1.delete(key));
        let removed = self.l2.delete(key).await;
        let l2 = u64::from(self.absorb_l2("delete", key, removed, false)?);
        Ok(PurgeCount { l1, l2 })
    }

    fn resolve_ttl(&self, key: &str, opts: &CacheOptions) -> Duration {
        opts.ttl
            .unwrap_or_else(|| self.ttl_policy.ttl_for_key(key))
    }

    /// Apply the L2 error policy to the result of one L2 call.
    fn absorb_l2<R>(
        &self,
        operation: &'static str,
        key: &str,
        result: FolioResult<R>,
        fallback: R,
    ) -> FolioResult<R> {
        match result {
            Ok(value) => Ok(value),
            Err(e)
                if e.is_tier_failure()
                    && self.config.l2_error_policy == L2ErrorPolicy::Degrade =>
            {
                tracing::warn!(
                    operation,
                    key = %key,
                    error = %e,
                    "L2 failure degraded to a miss"
                );
                Ok(fallback)
            }
            Err(e) => Err(e),
        }
    }
}

impl<S> Clone for TieredCache<S>
where
    S: SharedStore,
{
    fn clone(&self) -> Self {
        Self {
            l1: Arc::clone(&self.l1),
            l2: Arc::clone(&self.l2),
            ttl_policy: Arc::clone(&self.ttl_policy),
            detached: Arc::clone(&self.detached),
            config: self.config.clone(),
        }
    }
}

fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> FolioResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn decode<T: DeserializeOwned>(key: &str, value: &Value) -> FolioResult<T> {
    T::deserialize(value).map_err(|e| {
        CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
