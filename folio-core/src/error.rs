//! Error types for folio cache operations

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Cache tier discriminator used in error and log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Bounded in-process store.
    L1,
    /// Shared network store.
    L2,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1"),
            CacheTier::L2 => write!(f, "L2"),
        }
    }
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache tier {tier} unavailable: {reason}")]
    TierUnavailable { tier: CacheTier, reason: String },

    #[error("Cache tier {tier} timed out after {elapsed:?}")]
    Timeout { tier: CacheTier, elapsed: Duration },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Loader failed for key {key}: {reason}")]
    Loader { key: String, reason: String },
}

impl CacheError {
    /// Create a tier-unavailable error for the shared tier.
    pub fn l2_unavailable(reason: impl Into<String>) -> Self {
        CacheError::TierUnavailable {
            tier: CacheTier::L2,
            reason: reason.into(),
        }
    }

    /// Create a loader error for the given key.
    pub fn loader(key: impl Into<String>, reason: impl fmt::Display) -> Self {
        CacheError::Loader {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for IO failures of a cache tier (connection loss, timeout).
    ///
    /// These are the only errors an `L2ErrorPolicy::Degrade` cache swallows.
    pub fn is_tier_failure(&self) -> bool {
        matches!(
            self,
            CacheError::TierUnavailable { .. } | CacheError::Timeout { .. }
        )
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all folio errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FolioError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl FolioError {
    /// Returns true if this error is a cache tier IO failure.
    pub fn is_tier_failure(&self) -> bool {
        match self {
            FolioError::Cache(e) => e.is_tier_failure(),
            FolioError::Config(_) => false,
        }
    }
}

/// Result type alias for folio operations.
pub type FolioResult<T> = Result<T, FolioError>;

// =============================================================================
// TESTS
// =============================================================================
