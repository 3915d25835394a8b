//! Folio Storage - Cache Tiers
//!
//! The tiered cache that sits in front of slow data sources. Policy (keys,
//! TTLs, invalidation rules) lives in `folio-core`; this crate owns the
//! tiers and the read-through orchestration.

pub mod cache;

pub use cache::{
    CacheOptions, DetachedWrites, FlushReport, InMemorySharedStore, InvalidationReport, Loader,
    MemoryStats, MemoryStore, PurgeCount, SharedEntry, SharedStats, SharedStore, TieredCache,
    TieredStats, WarmEntry,
};
