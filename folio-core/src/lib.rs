//! Folio Core - Cache Policy
//!
//! Pure policy for the folio tiered cache: key construction, per-category
//! TTLs, wildcard patterns, invalidation rules, configuration and errors.
//! Nothing in this crate performs IO; the tiers live in `folio-storage`.

pub mod config;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod pattern;
pub mod ttl;

pub use config::{CacheConfig, L2ErrorPolicy};
pub use error::{CacheError, CacheTier, ConfigError, FolioError, FolioResult};
pub use invalidation::DomainChange;
pub use key::{
    build_key, build_prefix_pattern, category_of, CacheCategory, CacheCategoryParseError,
    DELIMITER, WILDCARD,
};
pub use pattern::{matches_pattern, KeyPattern};
pub use ttl::{TtlPolicy, FALLBACK_TTL};
