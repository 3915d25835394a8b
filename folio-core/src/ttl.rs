//! Time-to-live policy per cache category.

use std::collections::HashMap;
use std::time::Duration;

use crate::key::{category_of, CacheCategory};

/// TTL applied to categories missing from the table.
pub const FALLBACK_TTL: Duration = Duration::from_secs(300);

impl CacheCategory {
    /// Built-in time-to-live for this category.
    pub fn default_ttl(&self) -> Duration {
        let secs = match self {
            // Operational data changes constantly
            CacheCategory::Dashboard => 60,
            CacheCategory::Analytics => 120,
            // Session-scoped
            CacheCategory::User => 900,
            CacheCategory::Session => 900,
            // Domain aggregates
            CacheCategory::Project => 600,
            CacheCategory::Character => 1200,
            CacheCategory::Asset => 1800,
            // Expensive computed results
            CacheCategory::AiGeneration => 3600,
            // Immutable
            CacheCategory::StaticContent => 86_400,
        };
        Duration::from_secs(secs)
    }
}

/// Static table mapping a category name to its default TTL.
///
/// Read-only once built. Lookups never fail: an unknown category is logged
/// and served the fallback TTL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    table: HashMap<String, Duration>,
    fallback: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl TtlPolicy {
    /// Policy seeded with every built-in category.
    pub fn standard() -> Self {
        let table = CacheCategory::ALL
            .into_iter()
            .map(|c| (c.as_str().to_string(), c.default_ttl()))
            .collect();
        Self {
            table,
            fallback: FALLBACK_TTL,
        }
    }

    /// Override (or add) the TTL for one category.
    pub fn with_ttl(mut self, category: impl Into<String>, ttl: Duration) -> Self {
        self.table.insert(category.into(), ttl);
        self
    }

    /// Replace the TTL used for unknown categories.
    pub fn with_fallback(mut self, ttl: Duration) -> Self {
        self.fallback = ttl;
        self
    }

    /// TTL for unknown categories.
    pub fn fallback(&self) -> Duration {
        self.fallback
    }

    /// TTL for a category name.
    pub fn ttl_for(&self, category: &str) -> Duration {
        match self.table.get(category) {
            Some(ttl) => *ttl,
            None => {
                tracing::warn!(
                    category = %category,
                    fallback_secs = self.fallback.as_secs(),
                    "Unknown cache category, using fallback TTL"
                );
                self.fallback
            }
        }
    }

    /// TTL for a key, resolved through its leading category segment.
    pub fn ttl_for_key(&self, key: &str) -> Duration {
        self.ttl_for(category_of(key))
    }

    /// Returns true if the category has an explicit entry.
    pub fn contains(&self, category: &str) -> bool {
        self.table.contains_key(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_bands() {
        let policy = TtlPolicy::standard();
        assert_eq!(policy.ttl_for("user"), Duration::from_secs(900));
        assert_eq!(policy.ttl_for("session"), Duration::from_secs(900));
        assert_eq!(policy.ttl_for("dashboard"), Duration::from_secs(60));
        assert_eq!(policy.ttl_for("ai"), Duration::from_secs(3600));
        assert_eq!(policy.ttl_for("static"), Duration::from_secs(86_400));

        for category in [CacheCategory::Project, CacheCategory::Character, CacheCategory::Asset] {
            let ttl = policy.ttl_for(category.as_str()).as_secs();
            assert!((600..=1800).contains(&ttl), "{category} ttl {ttl}");
        }
    }

    #[test]
    fn test_unknown_category_falls_back() {
        let policy = TtlPolicy::standard();
        assert!(!policy.contains("widget"));
        assert_eq!(policy.ttl_for("widget"), FALLBACK_TTL);
        assert_eq!(policy.ttl_for(""), FALLBACK_TTL);
    }

    #[test]
    fn test_ttl_for_key_uses_leading_segment() {
        let policy = TtlPolicy::standard();
        assert_eq!(policy.ttl_for_key("project:p1:characters"), Duration::from_secs(600));
        assert_eq!(policy.ttl_for_key("mystery:1"), FALLBACK_TTL);
    }

    #[test]
    fn test_overrides() {
        let policy = TtlPolicy::standard()
            .with_ttl("user", Duration::from_secs(30))
            .with_ttl("widget", Duration::from_secs(45))
            .with_fallback(Duration::from_secs(10));

        assert_eq!(policy.ttl_for("user"), Duration::from_secs(30));
        assert_eq!(policy.ttl_for("widget"), Duration::from_secs(45));
        assert_eq!(policy.ttl_for("unknown"), Duration::from_secs(10));
        assert_eq!(policy.fallback(), Duration::from_secs(10));
    }
}
