//! Preflight request-header filtering.
use std::collections::HashSet;

/// The wildcard-all sentinel for allowed headers.
pub const ANY_HEADER: &str = "*";

/// Lower-cased allow-list of request headers.
#[derive(Debug, Clone, Default)]
pub struct HeaderAllowList {
    allow_all: bool,
    allowed: HashSet<String>,
}

impl HeaderAllowList {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for header in headers {
            let header = header.as_ref().trim();
            if header == ANY_HEADER {
                list.allow_all = true;
            } else if !header.is_empty() {
                list.allowed.insert(header.to_ascii_lowercase());
            }
        }
        list
    }

    pub fn allows_all(&self) -> bool {
        self.allow_all
    }

    pub fn is_empty(&self) -> bool {
        !self.allow_all && self.allowed.is_empty()
    }

    /// Intersect a comma-separated `Access-Control-Request-Headers` value
    /// with the allow-list. Comparison is case-insensitive and the result is
    /// lower-cased, in request order, joined with `", "`.
    pub fn filter(&self, requested: &str) -> String {
        requested
            .split(',')
            .map(|header| header.trim().to_ascii_lowercase())
            .filter(|header| !header.is_empty() && self.allowed.contains(header))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
