//! Folio Test Utilities
//!
//! Centralized test infrastructure for the folio workspace:
//! - Proptest generators for keys, patterns, JSON documents and configs
//! - Instrumented and failing shared stores
//! - Fixtures for common cache setups
//! - Custom assertions for cache results

// Re-export core types for convenience
pub use folio_core::{
    build_key, build_prefix_pattern, category_of, invalidation, matches_pattern, CacheCategory,
    CacheConfig, CacheError, CacheTier, ConfigError, DomainChange, FolioError, FolioResult,
    KeyPattern, L2ErrorPolicy, TtlPolicy,
};
pub use folio_storage::{
    CacheOptions, InMemorySharedStore, MemoryStore, PurgeCount, SharedEntry, SharedStats,
    SharedStore, TieredCache,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

// ============================================================================
// LOGGING
// ============================================================================

/// Install a test-friendly subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to debug output from the folio crates.
/// Later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "folio_core=debug,folio_storage=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK STORES
// ============================================================================

/// Shared store wrapper that counts calls per operation.
#[derive(Debug)]
pub struct CountingSharedStore<S = InMemorySharedStore> {
    inner: S,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl<S> CountingSharedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped store, for direct inspection without counting.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls made to `operation` since creation or the last reset.
    pub fn calls(&self, operation: &str) -> usize {
        self.counts().get(operation).copied().unwrap_or(0)
    }

    /// Calls made to any operation.
    pub fn total_calls(&self) -> usize {
        self.counts().values().sum()
    }

    pub fn reset(&self) {
        self.counts().clear();
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<&'static str, usize>> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, operation: &'static str) {
        *self.counts().entry(operation).or_insert(0) += 1;
    }
}

impl Default for CountingSharedStore<InMemorySharedStore> {
    fn default() -> Self {
        Self::new(InMemorySharedStore::new())
    }
}

#[async_trait]
impl<S: SharedStore> SharedStore for CountingSharedStore<S> {
    async fn get(&self, key: &str) -> FolioResult<Option<Value>> {
        self.record("get");
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> FolioResult<bool> {
        self.record("set");
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> FolioResult<bool> {
        self.record("delete");
        self.inner.delete(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> FolioResult<u64> {
        self.record("delete_pattern");
        self.inner.delete_pattern(pattern).await
    }

    async fn mset(&self, entries: Vec<SharedEntry>) -> FolioResult<()> {
        self.record("mset");
        self.inner.mset(entries).await
    }

    async fn stats(&self) -> FolioResult<SharedStats> {
        self.record("stats");
        self.inner.stats().await
    }

    async fn clear(&self) -> FolioResult<()> {
        self.record("clear");
        self.inner.clear().await
    }
}

/// How a [`FailingSharedStore`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Connection refused or reset.
    Unavailable,
    /// Every call times out after the given duration.
    Timeout(Duration),
}

/// Shared store whose every call fails with a tier error.
#[derive(Debug)]
pub struct FailingSharedStore {
    mode: FailureMode,
    calls: AtomicUsize,
}

impl FailingSharedStore {
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(FailureMode::Unavailable)
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self::new(FailureMode::Timeout(elapsed))
    }

    /// Calls attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<R>(&self) -> FolioResult<R> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let err = match self.mode {
            FailureMode::Unavailable => CacheError::l2_unavailable("connection refused"),
            FailureMode::Timeout(elapsed) => CacheError::Timeout {
                tier: CacheTier::L2,
                elapsed,
            },
        };
        Err(err.into())
    }
}

#[async_trait]
impl SharedStore for FailingSharedStore {
    async fn get(&self, _key: &str) -> FolioResult<Option<Value>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> FolioResult<bool> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> FolioResult<bool> {
        self.fail()
    }

    async fn delete_pattern(&self, _pattern: &str) -> FolioResult<u64> {
        self.fail()
    }

    async fn mset(&self, _entries: Vec<SharedEntry>) -> FolioResult<()> {
        self.fail()
    }

    async fn stats(&self) -> FolioResult<SharedStats> {
        self.fail()
    }

    async fn clear(&self) -> FolioResult<()> {
        self.fail()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for folio keys, patterns and values.

    use super::*;
    use proptest::prelude::*;

    /// Generate any cache category.
    pub fn arb_category() -> impl Strategy<Value = CacheCategory> {
        proptest::sample::select(CacheCategory::ALL.to_vec())
    }

    /// Generate a plain identifier (no delimiter or wildcard).
    pub fn arb_id() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,12}"
    }

    /// Generate an identifier that may contain reserved characters.
    pub fn arb_raw_id() -> impl Strategy<Value = String> {
        "[a-z0-9:*%]{0,10}"
    }

    /// Generate a well-formed key with one to three id components.
    pub fn arb_key() -> impl Strategy<Value = String> {
        (arb_category(), prop::collection::vec(arb_id(), 1..=3))
            .prop_map(|(category, ids)| build_key(category, ids))
    }

    /// Generate a category-scoped prefix pattern.
    pub fn arb_pattern() -> impl Strategy<Value = String> {
        (arb_category(), prop::collection::vec(arb_id(), 0..=1))
            .prop_map(|(category, ids)| build_prefix_pattern(category, ids))
    }

    /// Generate a JSON document. Numbers are integers so equality is exact.
    pub fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    /// Generate an L2 error policy.
    pub fn arb_error_policy() -> impl Strategy<Value = L2ErrorPolicy> {
        prop_oneof![Just(L2ErrorPolicy::Propagate), Just(L2ErrorPolicy::Degrade)]
    }

    /// Generate a configuration that passes validation.
    pub fn arb_valid_config() -> impl Strategy<Value = CacheConfig> {
        (
            1usize..5000,
            1u64..3600,
            arb_error_policy(),
            prop::option::of((arb_category(), 1u64..86400)),
        )
            .prop_map(|(max, ttl_secs, policy, override_ttl)| {
                let config = CacheConfig::default()
                    .with_l1_max_size(max)
                    .with_l1_default_ttl(Duration::from_secs(ttl_secs))
                    .with_l2_error_policy(policy);
                match override_ttl {
                    Some((category, secs)) => {
                        config.with_ttl_override(category.as_str(), Duration::from_secs(secs))
                    }
                    None => config,
                }
            })
    }

    /// Generate a domain change over plain identifiers.
    pub fn arb_domain_change() -> impl Strategy<Value = DomainChange> {
        prop_oneof![
            arb_id().prop_map(|user_id| DomainChange::UserUpdated { user_id }),
            arb_id().prop_map(|user_id| DomainChange::UserDeleted { user_id }),
            (arb_id(), arb_id()).prop_map(|(user_id, session_id)| DomainChange::SessionEnded {
                user_id,
                session_id
            }),
            arb_id().prop_map(|project_id| DomainChange::ProjectUpdated { project_id }),
            (arb_id(), arb_id()).prop_map(|(project_id, owner_id)| {
                DomainChange::ProjectDeleted {
                    project_id,
                    owner_id,
                }
            }),
            (arb_id(), arb_id()).prop_map(|(character_id, project_id)| {
                DomainChange::CharacterUpdated {
                    character_id,
                    project_id,
                }
            }),
            (arb_id(), arb_id()).prop_map(|(asset_id, project_id)| DomainChange::AssetUpdated {
                asset_id,
                project_id
            }),
            (arb_category(), arb_id()).prop_map(|(category, entity_id)| {
                DomainChange::AiOutputRegenerated {
                    category,
                    entity_id,
                }
            }),
            Just(DomainChange::StaticContentPublished),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built caches for common testing scenarios.

    use super::*;

    /// Default configuration with a small L1.
    pub fn small_config(l1_max_size: usize) -> CacheConfig {
        CacheConfig::default().with_l1_max_size(l1_max_size)
    }

    /// Cache over a fresh in-memory shared store.
    #[track_caller]
    pub fn memory_cache(
        config: CacheConfig,
    ) -> (TieredCache<InMemorySharedStore>, Arc<InMemorySharedStore>) {
        let l2 = Arc::new(InMemorySharedStore::new());
        let cache = TieredCache::new(Arc::clone(&l2), config).expect("fixture config is valid");
        (cache, l2)
    }

    /// Cache over a call-counting in-memory shared store.
    #[track_caller]
    pub fn counting_cache(
        config: CacheConfig,
    ) -> (TieredCache<CountingSharedStore>, Arc<CountingSharedStore>) {
        let l2 = Arc::new(CountingSharedStore::default());
        let cache = TieredCache::new(Arc::clone(&l2), config).expect("fixture config is valid");
        (cache, l2)
    }

    /// Cache whose shared tier is down.
    #[track_caller]
    pub fn failing_cache(
        policy: L2ErrorPolicy,
    ) -> (TieredCache<FailingSharedStore>, Arc<FailingSharedStore>) {
        let l2 = Arc::new(FailingSharedStore::unavailable());
        let config = CacheConfig::default().with_l2_error_policy(policy);
        let cache = TieredCache::new(Arc::clone(&l2), config).expect("fixture config is valid");
        (cache, l2)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over folio results.

    use super::*;

    /// Assert that a FolioResult is a tier failure.
    #[track_caller]
    pub fn assert_tier_failure<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(e) if e.is_tier_failure() => {}
            other => panic!("Expected tier failure, got: {:?}", other),
        }
    }

    /// Assert that a FolioResult is a Serialization error.
    #[track_caller]
    pub fn assert_serialization_error<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Cache(CacheError::Serialization { .. })) => {}
            other => panic!("Expected Serialization error, got: {:?}", other),
        }
    }

    /// Assert that a FolioResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that no key in `keys` matches `pattern`.
    #[track_caller]
    pub fn assert_none_match(keys: &[String], pattern: &str) {
        let parsed = KeyPattern::parse(pattern);
        let stale: Vec<&String> = keys.iter().filter(|key| parsed.matches(key)).collect();
        assert!(
            stale.is_empty(),
            "Keys {:?} still match pattern {}",
            stale,
            pattern
        );
    }

    /// Assert that an L1 store respects its capacity.
    #[track_caller]
    pub fn assert_within_capacity<V: Clone>(store: &MemoryStore<V>) {
        let stats = store.stats();
        assert!(
            stats.size <= stats.max_size,
            "L1 size {} exceeds capacity {}",
            stats.size,
            stats.max_size
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
