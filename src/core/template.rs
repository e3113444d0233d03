//! Route template compilation.
//!
//! A template such as `/users/{id}/posts/{post}` is compiled into an anchored
//! regular expression plus the ordered list of placeholder names. Both come
//! out of a single pass over the placeholder matches, so the i-th name is
//! always bound to the i-th capture group.
//!
//! A trailing `*` turns the template into a catch-all: the text before it
//! must prefix the path and anything may follow.
use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::core::params::PathParams;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"));

/// Capture expression substituted for every `{name}` placeholder.
const SEGMENT_CAPTURE: &str = "([^/]+)";

/// Errors raised while registering a route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteError {
    #[error("Route template must not be empty")]
    EmptyTemplate,

    #[error("Invalid route template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Duplicate parameter '{name}' in route template '{template}'")]
    DuplicateParam { template: String, name: String },

    #[error("Wildcard '*' is only allowed at the end of route template '{template}'")]
    MisplacedWildcard { template: String },
}

/// Matching class of a template, in resolution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RouteKind {
    /// No placeholders, no wildcard.
    Static,
    /// At least one `{name}` placeholder.
    Parameterized,
    /// Ends in `*`.
    CatchAll,
}

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    raw: String,
    pattern: Regex,
    params: Vec<String>,
    kind: RouteKind,
    literal_len: usize,
}

impl RouteTemplate {
    /// Compile `raw` into a matcher and its parameter schema.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        if raw.is_empty() {
            return Err(RouteError::EmptyTemplate);
        }

        let (body, catch_all) = match raw.strip_suffix('*') {
            Some(body) => (body, true),
            None => (raw, false),
        };
        if body.contains('*') {
            return Err(RouteError::MisplacedWildcard {
                template: raw.to_string(),
            });
        }

        let mut pattern = String::with_capacity(raw.len() + 16);
        pattern.push('^');
        let mut params: Vec<String> = Vec::new();
        let mut literal_len = 0;
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(body) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let literal = &body[last..whole.start()];
            push_literal(raw, literal, &mut pattern)?;
            literal_len += literal.len();

            let name = name.as_str();
            if params.iter().any(|existing| existing == name) {
                return Err(RouteError::DuplicateParam {
                    template: raw.to_string(),
                    name: name.to_string(),
                });
            }
            params.push(name.to_string());
            pattern.push_str(SEGMENT_CAPTURE);
            last = whole.end();
        }

        let tail = &body[last..];
        push_literal(raw, tail, &mut pattern)?;
        literal_len += tail.len();

        if catch_all {
            pattern.push_str(".*");
        }
        pattern.push('$');

        let pattern = Regex::new(&pattern).map_err(|e| RouteError::InvalidTemplate {
            template: raw.to_string(),
            reason: e.to_string(),
        })?;

        let kind = if catch_all {
            RouteKind::CatchAll
        } else if params.is_empty() {
            RouteKind::Static
        } else {
            RouteKind::Parameterized
        };

        Ok(Self {
            raw: raw.to_string(),
            pattern,
            params,
            kind,
            literal_len,
        })
    }

    /// The template exactly as registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in template order.
    pub fn param_names(&self) -> &[String] {
        &self.params
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// Whether the whole of `path` is accepted by this template.
    pub fn is_match(&self, path: &str) -> bool {
        match self.kind {
            RouteKind::Static => path == self.raw,
            _ => self.pattern.is_match(path),
        }
    }

    /// Match `path` and bind the captured segments positionally.
    ///
    /// Matching runs on the raw path, so an encoded `%2F` stays inside its
    /// segment. Captured values are then percent-decoded; a value that does
    /// not decode to UTF-8 is bound as-is.
    pub fn captures(&self, path: &str) -> Option<PathParams> {
        if self.kind == RouteKind::Static {
            return (path == self.raw).then(PathParams::default);
        }

        let caps = self.pattern.captures(path)?;
        let mut params = PathParams::with_capacity(self.params.len());
        for (index, name) in self.params.iter().enumerate() {
            let raw = caps.get(index + 1).map(|m| m.as_str()).unwrap_or_default();
            let value = urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            params.push(name.as_str(), value);
        }
        Some(params)
    }

    /// Resolution order between two templates: kind first, then the template
    /// with more literal text. Equal templates compare equal; callers break
    /// the tie by registration order.
    pub fn precedence(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| other.literal_len.cmp(&self.literal_len))
    }
}

fn push_literal(template: &str, literal: &str, pattern: &mut String) -> Result<(), RouteError> {
    if literal.contains(['{', '}']) {
        return Err(RouteError::InvalidTemplate {
            template: template.to_string(),
            reason: "placeholders must look like '{name}' with a word-character name".to_string(),
        });
    }
    pattern.push_str(&regex::escape(literal));
    Ok(())
}
