//! Tiered cache: a bounded in-process tier in front of a shared network tier.
//!
//! This module provides the L1 store, the L2 contract with an in-memory
//! reference implementation, and the orchestrator that composes them with a
//! caller-supplied loader.
//!
//! # Consistency
//!
//! Reads never return a value already observed expired in the tier it came
//! from. They may return data stale relative to a concurrent writer whose
//! `set` has not completed yet: there is no cross-request locking, and
//! concurrent misses on one key may all run the loader.
//!
//! # Invalidation
//!
//! Domain event handlers turn a mutation into patterns with
//! [`folio_core::invalidation`] and hand them to
//! [`TieredCache::invalidate_patterns`] (or [`TieredCache::apply`]).
//!
//! # Example
//!
//! ```ignore
//! let cache = TieredCache::new(shared_store, CacheConfig::from_env())?;
//!
//! cache.set("user:u1", &profile, &CacheOptions::new()).await?;
//! let cached: Option<Profile> = cache.get("user:u1", &CacheOptions::new()).await?;
//!
//! let report = cache
//!     .invalidate_patterns(folio_core::invalidation::user_updated("u1"))
//!     .await?;
//! tracing::info!(invalidated = report.invalidated, "Purged user views");
//! ```

pub mod memory;
pub mod shared;
pub mod tiered;
pub mod writeback;

pub use memory::{MemoryStats, MemoryStore};
pub use shared::{InMemorySharedStore, SharedEntry, SharedStats, SharedStore};
pub use tiered::{
    CacheOptions, InvalidationReport, Loader, PurgeCount, TieredCache, TieredStats, WarmEntry,
};
pub use writeback::{DetachedWrites, FlushReport};
