//! Wildcard key patterns for bulk invalidation.
//!
//! `*` matches any run of characters (including `:`). Everything else in a
//! pattern is matched literally: segments are passed through
//! `regex::escape` before the wildcard is expanded, so `.` or `+` inside a
//! key never widen a match.

use regex::Regex;
use std::fmt;

use crate::key::WILDCARD;

/// A parsed invalidation pattern: either one exact key or a wildcard match.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact,
    Wildcard(Regex),
    /// Expression exceeded the regex size limit; match on the literal prefix.
    Prefix,
}

impl KeyPattern {
    /// Parse a pattern string.
    pub fn parse(pattern: &str) -> Self {
        let matcher = if pattern.contains(WILDCARD) {
            match compile(pattern) {
                Ok(re) => Matcher::Wildcard(re),
                Err(e) => {
                    tracing::warn!(
                        pattern = %pattern,
                        error = %e,
                        "Pattern too large to compile, widening to its literal prefix"
                    );
                    Matcher::Prefix
                }
            }
        } else {
            Matcher::Exact
        };
        Self {
            source: pattern.to_string(),
            matcher,
        }
    }

    /// Returns true if the pattern contains a wildcard.
    pub fn is_wildcard(&self) -> bool {
        !matches!(self.matcher, Matcher::Exact)
    }

    /// The original pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Literal text before the first wildcard (the whole key for exact patterns).
    pub fn literal_prefix(&self) -> &str {
        match self.source.find(WILDCARD) {
            Some(idx) => &self.source[..idx],
            None => &self.source,
        }
    }

    /// Test a key against this pattern.
    pub fn matches(&self, key: &str) -> bool {
        match &self.matcher {
            Matcher::Exact => self.source == key,
            Matcher::Wildcard(re) => re.is_match(key),
            Matcher::Prefix => key.starts_with(self.literal_prefix()),
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for KeyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for KeyPattern {}

impl From<&str> for KeyPattern {
    fn from(pattern: &str) -> Self {
        Self::parse(pattern)
    }
}

/// One-shot match of a key against a pattern string.
pub fn matches_pattern(key: &str, pattern: &str) -> bool {
    KeyPattern::parse(pattern).matches(key)
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?s)^{body}$"))
}
