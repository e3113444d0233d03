//! Origin allow-list matching.
//!
//! Configured origins come in three shapes: the `*` sentinel (everything is
//! allowed), exact strings, and patterns with a single `*` standing for any
//! run of characters (`https://*.example.com`). A pattern with more than one
//! `*` is not a pattern at all; it only matches an origin spelled exactly like
//! it.
use std::collections::HashSet;

/// The wildcard-all sentinel.
pub const ANY_ORIGIN: &str = "*";

/// A single-wildcard origin pattern split around its `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardOrigin {
    prefix: String,
    suffix: String,
}

impl WildcardOrigin {
    /// Split `pattern` around its wildcard. Returns `None` unless the pattern
    /// contains exactly one `*`.
    pub fn parse(pattern: &str) -> Option<Self> {
        let (prefix, suffix) = pattern.split_once('*')?;
        if suffix.contains('*') {
            return None;
        }
        Some(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn matches(&self, origin: &str) -> bool {
        origin.len() >= self.prefix.len() + self.suffix.len()
            && origin.starts_with(&self.prefix)
            && origin.ends_with(&self.suffix)
    }
}

/// Decides whether a request origin is permitted.
#[derive(Debug, Clone, Default)]
pub struct OriginMatcher {
    allow_all: bool,
    exact: HashSet<String>,
    wildcards: Vec<WildcardOrigin>,
}

impl OriginMatcher {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::default();
        for origin in origins {
            let origin = origin.as_ref();
            if origin == ANY_ORIGIN {
                matcher.allow_all = true;
                continue;
            }
            match WildcardOrigin::parse(origin) {
                Some(wildcard) => matcher.wildcards.push(wildcard),
                None => {
                    matcher.exact.insert(origin.to_string());
                }
            }
        }
        matcher
    }

    /// Whether `*` was configured.
    pub fn allows_all(&self) -> bool {
        self.allow_all
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        if self.allow_all {
            return true;
        }
        if origin.is_empty() {
            return false;
        }
        self.exact.contains(origin) || self.wildcards.iter().any(|w| w.matches(origin))
    }
}
