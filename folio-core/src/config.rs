//! Cache configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, FolioResult};
use crate::ttl::TtlPolicy;

/// How the tiered cache reacts to a failing shared tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum L2ErrorPolicy {
    /// Return the error to the caller.
    #[default]
    Propagate,
    /// Log, treat the tier as a miss for this call and continue with L1 and the loader.
    Degrade,
}

impl L2ErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            L2ErrorPolicy::Propagate => "propagate",
            L2ErrorPolicy::Degrade => "degrade",
        }
    }
}

impl fmt::Display for L2ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for L2ErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "propagate" => Ok(L2ErrorPolicy::Propagate),
            "degrade" => Ok(L2ErrorPolicy::Degrade),
            _ => Err(ConfigError::InvalidValue {
                field: "l2_error_policy".to_string(),
                value: s.to_string(),
                reason: "expected 'propagate' or 'degrade'".to_string(),
            }),
        }
    }
}

/// Configuration for the tiered cache.
///
/// Deployment-time constants; nothing here is persisted by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held in L1.
    pub l1_max_size: usize,
    /// TTL for L1 writes whose key has no better source, in seconds.
    #[serde(with = "duration_secs")]
    pub l1_default_ttl: Duration,
    /// Reaction to shared tier failures.
    pub l2_error_policy: L2ErrorPolicy,
    /// Per-category TTLs (seconds) merged over the built-in table.
    pub ttl_overrides: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_size: 1000,
            l1_default_ttl: Duration::from_secs(300),
            l2_error_policy: L2ErrorPolicy::Propagate,
            ttl_overrides: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `FOLIO_CACHE_*` environment variables.
    ///
    /// Unset values keep their defaults. Unparsable values keep their
    /// defaults and log a warning.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            l1_max_size: parse_var(&lookup, "FOLIO_CACHE_L1_MAX_SIZE", defaults.l1_max_size),
            l1_default_ttl: Duration::from_secs(parse_var(
                &lookup,
                "FOLIO_CACHE_L1_DEFAULT_TTL_SECS",
                defaults.l1_default_ttl.as_secs(),
            )),
            l2_error_policy: parse_var(
                &lookup,
                "FOLIO_CACHE_L2_ERROR_POLICY",
                defaults.l2_error_policy,
            ),
            ttl_overrides: defaults.ttl_overrides,
        }
    }

    /// Set the L1 capacity.
    pub fn with_l1_max_size(mut self, max: usize) -> Self {
        self.l1_max_size = max;
        self
    }

    /// Set the L1 default TTL.
    pub fn with_l1_default_ttl(mut self, ttl: Duration) -> Self {
        self.l1_default_ttl = ttl;
        self
    }

    /// Set the shared tier error policy.
    pub fn with_l2_error_policy(mut self, policy: L2ErrorPolicy) -> Self {
        self.l2_error_policy = policy;
        self
    }

    /// Override the TTL of one category.
    pub fn with_ttl_override(mut self, category: impl Into<String>, ttl: Duration) -> Self {
        self.ttl_overrides.insert(category.into(), ttl.as_secs());
        self
    }

    /// Build the TTL policy: built-in table, then overrides.
    ///
    /// Unknown categories fall back to the L1 default TTL.
    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl_overrides.iter().fold(
            TtlPolicy::standard().with_fallback(self.l1_default_ttl),
            |policy, (category, secs)| policy.with_ttl(category.clone(), Duration::from_secs(*secs)),
        )
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - l1_max_size > 0
    /// - l1_default_ttl > 0
    /// - every TTL override > 0
    pub fn validate(&self) -> FolioResult<()> {
        if self.l1_max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "l1_max_size".to_string(),
                value: "0".to_string(),
                reason: "L1 must hold at least one entry".to_string(),
            }
            .into());
        }

        if self.l1_default_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "l1_default_ttl".to_string(),
                value: "0s".to_string(),
                reason: "TTL must be positive".to_string(),
            }
            .into());
        }

        if let Some((category, _)) = self.ttl_overrides.iter().find(|(_, secs)| **secs == 0) {
            return Err(ConfigError::InvalidValue {
                field: format!("ttl_overrides.{category}"),
                value: "0".to_string(),
                reason: "TTL must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + fmt::Debug,
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    var = name,
                    value = %raw,
                    error = %e,
                    default = ?default,
                    "Ignoring malformed cache setting"
                );
                default
            }
        },
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
