//! Per-request values exposed to business handlers.
//!
//! Path parameters are stored in the request extensions under their own type,
//! so they can never collide with unrelated extension data.
use http::Request;

/// Ordered, read-only bag of path parameters bound for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Value bound to `name`, if the matched template declares it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in template order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Path parameter `name` of the matched route, or `""` when the request was
/// not routed or the template has no such placeholder.
pub fn get_param<'a, B>(req: &'a Request<B>, name: &str) -> &'a str {
    req.extensions()
        .get::<PathParams>()
        .and_then(|params| params.get(name))
        .unwrap_or("")
}

/// First value of query parameter `name`, form-decoded, or `""` if absent.
pub fn get_query<B>(req: &Request<B>, name: &str) -> String {
    req.uri()
        .query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}
