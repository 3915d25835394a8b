//! End-to-end behaviour of the tiered cache over healthy and failing shared stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_core::invalidation::{project_updated, user_updated};
use folio_core::{
    build_key, CacheCategory, CacheConfig, CacheError, DomainChange, FolioError, FolioResult,
    L2ErrorPolicy, TtlPolicy,
};
use folio_storage::{CacheOptions, FlushReport, Loader, PurgeCount, TieredCache, WarmEntry};
use folio_test_utils::{assertions, fixtures, CountingSharedStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

fn setup(config: CacheConfig) -> (TieredCache<CountingSharedStore>, Arc<CountingSharedStore>) {
    fixtures::counting_cache(config)
}

#[tokio::test]
async fn set_then_l1_only_get_skips_l2() {
    let (cache, l2) = setup(CacheConfig::default());
    cache
        .set("project:p1", &json!({"title": "Draft"}), &CacheOptions::new())
        .await
        .unwrap();
    l2.reset();

    let got: Option<Value> = cache
        .get("project:p1", &CacheOptions::new().skip_l2())
        .await
        .unwrap();

    assert_eq!(got, Some(json!({"title": "Draft"})));
    assert_eq!(l2.total_calls(), 0);
}

#[tokio::test]
async fn l1_hit_makes_no_network_round_trip() {
    let (cache, l2) = setup(CacheConfig::default());
    cache.set("asset:a1", &"blob", &CacheOptions::new()).await.unwrap();
    l2.reset();

    let got: Option<String> = cache.get("asset:a1", &CacheOptions::new()).await.unwrap();
    assert_eq!(got.as_deref(), Some("blob"));
    assert_eq!(l2.total_calls(), 0);
}

#[tokio::test]
async fn delete_then_get_returns_none_from_both_tiers() {
    let (cache, l2) = setup(CacheConfig::default());
    cache.set("character:c1", &"Mara", &CacheOptions::new()).await.unwrap();
    cache.delete("character:c1").await.unwrap();

    let got: Option<String> = cache.get("character:c1", &CacheOptions::new()).await.unwrap();
    assert_eq!(got, None);
    assert!(!l2.inner().contains("character:c1").await);

    // Idempotent
    assert!(!cache.delete("character:c1").await.unwrap());
}

#[tokio::test]
async fn ttl_expiry_removes_entry_from_l1() {
    let (cache, _) = setup(CacheConfig::default());
    cache
        .set(
            "session:u1:s1",
            &"state",
            &CacheOptions::new().with_ttl(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert_eq!(cache.l1().stats().size, 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let got: Option<String> = cache
        .get("session:u1:s1", &CacheOptions::new().skip_l2())
        .await
        .unwrap();
    assert_eq!(got, None);
    assert_eq!(cache.l1().stats().size, 0);
}

#[tokio::test]
async fn l1_evicts_earliest_inserted_at_capacity() {
    let (cache, _) = setup(CacheConfig::default().with_l1_max_size(2));
    let opts = CacheOptions::new().skip_l2();
    cache.set("a", &1, &opts).await.unwrap();
    cache.set("b", &2, &opts).await.unwrap();
    cache.set("c", &3, &opts).await.unwrap();

    assert_eq!(cache.l1().len(), 2);
    assert_eq!(cache.get::<i32>("a", &opts).await.unwrap(), None);
    assert_eq!(cache.get::<i32>("b", &opts).await.unwrap(), Some(2));
    assert_eq!(cache.get::<i32>("c", &opts).await.unwrap(), Some(3));
}

#[tokio::test]
async fn pattern_invalidation_spans_both_tiers() {
    let (cache, l2) = setup(CacheConfig::default());
    let opts = CacheOptions::new();
    cache.set("project:1:x", &"v1", &opts).await.unwrap();
    cache.set("project:1:y", &"v2", &opts).await.unwrap();
    cache.set("project:2:z", &"v3", &opts).await.unwrap();

    let count = cache.invalidate("project:1:*").await.unwrap();
    assert_eq!(count, PurgeCount { l1: 2, l2: 2 });

    assert_eq!(cache.l1().keys(), vec!["project:2:z"]);
    assert_eq!(l2.inner().keys().await, vec!["project:2:z"]);

    // Second pass on an empty match set.
    assert_eq!(
        cache.invalidate("project:1:*").await.unwrap(),
        PurgeCount::default()
    );
}

#[tokio::test]
async fn read_through_backfills_l1() {
    let (cache, _) = setup(CacheConfig::default());
    let got = cache
        .get_or_load("user:u9", &CacheOptions::new(), || async {
            Ok(Some(User {
                name: "Iris".to_string(),
            }))
        })
        .await
        .unwrap();
    assert_eq!(got.map(|u| u.name), Some("Iris".to_string()));

    let cached: Option<User> = cache
        .get("user:u9", &CacheOptions::new().skip_l2())
        .await
        .unwrap();
    assert_eq!(cached.map(|u| u.name), Some("Iris".to_string()));
}

#[tokio::test]
async fn all_miss_without_loader_returns_none() {
    let (cache, l2) = setup(CacheConfig::default());
    let got: Option<User> = cache.get("user:nobody", &CacheOptions::new()).await.unwrap();
    assert_eq!(got, None);
    assert_eq!(l2.calls("get"), 1);
    assert_eq!(l2.total_calls(), 1);
}

#[tokio::test]
async fn end_to_end_user_scenario() {
    let (cache, _) = setup(CacheConfig::default());

    assert_eq!(
        TtlPolicy::standard().ttl_for(CacheCategory::User.as_str()),
        Duration::from_secs(900)
    );
    let key = build_key("user", ["u1"]);
    assert_eq!(key, "user:u1");

    let ann = User {
        name: "Ann".to_string(),
    };
    cache.set(&key, &ann, &CacheOptions::new()).await.unwrap();
    let got: Option<User> = cache.get(&key, &CacheOptions::new()).await.unwrap();
    assert_eq!(got, Some(ann));

    let patterns = user_updated("u1");
    assert_eq!(patterns, vec!["user:u1", "user:u1:projects"]);

    let report = cache.invalidate_patterns(&patterns).await.unwrap();
    assert_eq!(report.invalidated, 1);

    let got: Option<User> = cache.get(&key, &CacheOptions::new()).await.unwrap();
    assert_eq!(got, None);
}

#[tokio::test]
async fn domain_change_purges_project_views() {
    let (cache, _) = setup(CacheConfig::default());
    let opts = CacheOptions::new();
    cache.set("project:p1", &"meta", &opts).await.unwrap();
    cache.set("project:p1:characters", &["c1"], &opts).await.unwrap();
    cache.set("dashboard:overview", &3, &opts).await.unwrap();
    cache.set("project:p2", &"other", &opts).await.unwrap();

    let change = DomainChange::ProjectUpdated {
        project_id: "p1".to_string(),
    };
    assert_eq!(change.patterns(), project_updated("p1"));

    let report = cache.apply(&change).await.unwrap();
    assert_eq!(report.invalidated, 3);
    assert_eq!(report.l1, 3);
    assert_eq!(report.l2, 3);
    assert_eq!(cache.l1().keys(), vec!["project:p2"]);
}

#[tokio::test]
async fn warm_populates_both_tiers_in_one_batch() {
    let (cache, l2) = setup(CacheConfig::default());
    let entries = vec![
        WarmEntry::new("static:home", &"<html>", None).unwrap(),
        WarmEntry::new("ai:character:c1:bio", &"A wanderer", Some(Duration::from_secs(60)))
            .unwrap(),
    ];

    assert_eq!(cache.warm(entries).await.unwrap(), 2);
    assert_eq!(l2.calls("mset"), 1);
    assert_eq!(l2.total_calls(), 1);
    assert!(cache.l1().contains("static:home"));
    assert!(l2.inner().contains("ai:character:c1:bio").await);

    assert_eq!(cache.warm(Vec::new()).await.unwrap(), 0);
    assert_eq!(l2.total_calls(), 1);
}

#[tokio::test]
async fn stats_report_both_tiers() {
    let (cache, _) = setup(CacheConfig::default().with_l1_max_size(10));
    cache.set("user:u1", &1, &CacheOptions::new()).await.unwrap();
    let _: Option<i32> = cache.get("user:u1", &CacheOptions::new()).await.unwrap();

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.l1.size, 1);
    assert_eq!(stats.l1.max_size, 10);
    assert_eq!(stats.l1.hits, 1);
    assert_eq!(stats.l2.map(|s| s.size), Some(1));
}

#[tokio::test]
async fn clear_empties_both_tiers() {
    let (cache, l2) = setup(CacheConfig::default());
    cache.set("user:u1", &1, &CacheOptions::new()).await.unwrap();
    cache.set("user:u2", &2, &CacheOptions::new()).await.unwrap();
    cache.clear().await.unwrap();

    assert!(cache.l1().is_empty());
    assert!(l2.inner().keys().await.is_empty());
}

#[tokio::test]
async fn detached_writes_land_after_flush() {
    let (cache, l2) = setup(CacheConfig::default());
    for i in 0..10 {
        cache
            .set_detached(&format!("analytics:day{i}"), &i, &CacheOptions::new())
            .unwrap();
    }
    // L1 is written synchronously.
    assert_eq!(cache.l1().len(), 10);

    let report = cache.flush().await;
    assert_eq!(report, FlushReport { completed: 10, failed: 0 });
    assert_eq!(l2.inner().keys().await.len(), 10);
}

#[tokio::test]
async fn clones_share_tiers() {
    let (cache, _) = setup(CacheConfig::default());
    let other = cache.clone();
    cache.set("user:u1", &"Ann", &CacheOptions::new()).await.unwrap();

    let got: Option<String> = other
        .get("user:u1", &CacheOptions::new().skip_l2())
        .await
        .unwrap();
    assert_eq!(got.as_deref(), Some("Ann"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_may_all_load() {
    let (cache, _) = setup(CacheConfig::default());
    let loads = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let loads = Arc::clone(&loads);
            tokio::spawn(async move {
                cache
                    .get_or_load("ai:project:p1:summary", &CacheOptions::new(), || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(Some("summary".to_string()))
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        let got = handle.await.expect("task panicked").unwrap();
        assert_eq!(got.as_deref(), Some("summary"));
    }

    // No single-flight: at least one load, possibly one per caller.
    let loads = loads.load(Ordering::SeqCst);
    assert!((1..=8).contains(&loads));
    assert_eq!(cache.l1().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_writers_never_exceed_l1_capacity() {
    let (cache, _) = setup(CacheConfig::default().with_l1_max_size(32));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    let key = build_key(CacheCategory::Asset, [format!("t{t}"), format!("{i}")]);
                    cache.set(&key, &i, &CacheOptions::new()).await.unwrap();
                    assert!(cache.l1().len() <= 32);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked");
    }
    assert_eq!(cache.l1().len(), 32);
}

struct MapLoader {
    rows: HashMap<String, User>,
    calls: AtomicUsize,
}

#[async_trait]
impl Loader<User> for MapLoader {
    async fn load(&self, key: &str) -> FolioResult<Option<User>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.get(key).cloned())
    }
}

#[tokio::test]
async fn loader_trait_reads_through() {
    let (cache, _) = setup(CacheConfig::default());
    let loader = MapLoader {
        rows: HashMap::from([(
            "user:u3".to_string(),
            User {
                name: "Teo".to_string(),
            },
        )]),
        calls: AtomicUsize::new(0),
    };

    let first = cache
        .get_with("user:u3", &CacheOptions::new(), &loader)
        .await
        .unwrap();
    let second = cache
        .get_with("user:u3", &CacheOptions::new(), &loader)
        .await
        .unwrap();
    let missing = cache
        .get_with("user:u404", &CacheOptions::new(), &loader)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(missing, None);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
}

fn ann() -> User {
    User {
        name: "Ann".to_string(),
    }
}

#[tokio::test]
async fn detached_write_outlives_dropped_cache() {
    let (cache, l2) = setup(CacheConfig::default());
    cache
        .set_detached("user:u5", &ann(), &CacheOptions::new())
        .unwrap();
    drop(cache);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(l2.inner().contains("user:u5").await);
}

#[tokio::test]
async fn propagate_policy_surfaces_l2_failure() {
    let (cache, _) = fixtures::failing_cache(L2ErrorPolicy::Propagate);
    assertions::assert_tier_failure(&cache.get::<User>("user:u1", &CacheOptions::new()).await);

    // L1 was written before the L2 failure surfaced.
    assertions::assert_tier_failure(&cache.set("user:u1", &ann(), &CacheOptions::new()).await);
    assert!(cache.l1().contains("user:u1"));
}

#[tokio::test]
async fn degrade_policy_falls_through_to_loader() {
    let (cache, l2) = fixtures::failing_cache(L2ErrorPolicy::Degrade);
    let got = cache
        .get_or_load("user:u1", &CacheOptions::new(), || async { Ok(Some(ann())) })
        .await
        .unwrap();
    assert_eq!(got, Some(ann()));
    assert!(cache.l1().contains("user:u1"));
    // One failed get, one failed write-through.
    assert_eq!(l2.calls(), 2);

    let count = cache.invalidate("user:*").await.unwrap();
    assert_eq!(count, PurgeCount { l1: 1, l2: 0 });

    let stats = cache.stats().await.unwrap();
    assert!(stats.l2.is_none());
    assert!(cache.clear().await.is_ok());
}

#[tokio::test]
async fn degrade_policy_keeps_loader_errors() {
    let (cache, _) = fixtures::failing_cache(L2ErrorPolicy::Degrade);
    let err = cache
        .get_or_load::<User, _, _>("user:u1", &CacheOptions::new(), || async {
            Err(CacheError::loader("user:u1", "timeout").into())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FolioError::Cache(CacheError::Loader { .. })));
}

#[tokio::test]
async fn skipping_l2_never_touches_failing_store() {
    let (cache, l2) = fixtures::failing_cache(L2ErrorPolicy::Propagate);
    let opts = CacheOptions::new().skip_l2();
    cache.set("user:u1", &ann(), &opts).await.unwrap();
    let got: Option<User> = cache.get("user:u1", &opts).await.unwrap();
    assert_eq!(got, Some(ann()));
    assert_eq!(l2.calls(), 0);
}
