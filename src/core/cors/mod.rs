//! CORS negotiation.
//!
//! [`CorsNegotiator`] is built once from a [`CorsConfig`] and then decides,
//! per request, whether the request is rejected, answered as a preflight, or
//! forwarded, and which `Access-Control-*` headers go on the response.
//!
//! ```text
//! Origin not allowed ── OPTIONS, no passthrough ──▶ 403
//!                    └─ otherwise ────────────────▶ inner handler, no CORS headers
//! Origin allowed ───── OPTIONS ──▶ allow-methods / allow-headers / max-age
//!                    │             └─ no passthrough ─▶ 204
//!                    │             └─ passthrough ────▶ inner handler
//!                    └─ other ───▶ expose-headers ─▶ inner handler
//! ```
pub mod headers;
pub mod origin;

use http::{HeaderMap, HeaderValue, Method, header};

pub use self::{
    headers::HeaderAllowList,
    origin::{OriginMatcher, WildcardOrigin},
};
use crate::config::models::CorsConfig;

/// Non-standard diagnostics header emitted in debug mode.
pub const X_CORS_DEBUG: &str = "x-cors-debug";

/// What the CORS layer does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsDecision {
    /// Preflight from a disallowed origin: answer 403 and stop.
    Forbidden { headers: HeaderMap },
    /// Preflight handled here: answer 204 and stop.
    Preflight { headers: HeaderMap },
    /// Call the inner handler, then merge `headers` into its response.
    Forward { headers: HeaderMap },
}

impl CorsDecision {
    pub fn headers(&self) -> &HeaderMap {
        match self {
            CorsDecision::Forbidden { headers }
            | CorsDecision::Preflight { headers }
            | CorsDecision::Forward { headers } => headers,
        }
    }
}

/// Immutable CORS policy compiled from a [`CorsConfig`].
#[derive(Debug, Clone)]
pub struct CorsNegotiator {
    origins: OriginMatcher,
    allowed_methods: Option<HeaderValue>,
    allowed_headers: HeaderAllowList,
    exposed_headers: Option<HeaderValue>,
    max_age: Option<HeaderValue>,
    allow_credentials: bool,
    options_passthrough: bool,
    debug: bool,
}

impl CorsNegotiator {
    pub fn new(config: &CorsConfig) -> Self {
        let origins = if config.allowed_origins.is_empty() {
            OriginMatcher::new([origin::ANY_ORIGIN])
        } else {
            OriginMatcher::new(&config.allowed_origins)
        };

        let methods = if config.allowed_methods.is_empty() {
            vec![
                Method::GET.to_string(),
                Method::POST.to_string(),
                Method::HEAD.to_string(),
            ]
        } else {
            config.allowed_methods.clone()
        };

        let negotiator = Self {
            origins,
            allowed_methods: joined_header_value("allowed_methods", &methods),
            allowed_headers: HeaderAllowList::new(&config.allowed_headers),
            exposed_headers: joined_header_value("exposed_headers", &config.exposed_headers),
            max_age: (config.max_age > 0).then(|| HeaderValue::from(config.max_age)),
            allow_credentials: config.allow_credentials,
            options_passthrough: config.options_passthrough,
            debug: config.debug,
        };

        tracing::debug!(
            allow_all_origins = negotiator.origins.allows_all(),
            allow_credentials = negotiator.allow_credentials,
            options_passthrough = negotiator.options_passthrough,
            "CORS negotiator configured"
        );
        negotiator
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.origins.is_allowed(origin)
    }

    /// Decide how to treat a request with the given method and headers.
    pub fn negotiate(&self, method: &Method, request_headers: &HeaderMap) -> CorsDecision {
        let origin_value = request_headers.get(header::ORIGIN);
        let origin = origin_value
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let is_preflight = method == Method::OPTIONS;
        let mut headers = HeaderMap::new();

        if !self.origins.is_allowed(origin) {
            tracing::debug!(origin = %origin, method = %method, "CORS origin not allowed");
            if self.debug {
                if let Ok(value) = HeaderValue::from_str(&format!("Origin not allowed: {origin}")) {
                    headers.insert(X_CORS_DEBUG, value);
                }
            }
            if is_preflight && !self.options_passthrough {
                return CorsDecision::Forbidden { headers };
            }
            return CorsDecision::Forward { headers };
        }

        if self.origins.allows_all() && !self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
        } else {
            if let Some(value) = origin_value {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value.clone());
            }
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
        }

        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }

        if !is_preflight {
            if let Some(exposed) = &self.exposed_headers {
                headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed.clone());
            }
            return CorsDecision::Forward { headers };
        }

        if let Some(methods) = &self.allowed_methods {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, methods.clone());
        }

        // A value that is not visible ASCII is treated as absent.
        let requested = request_headers
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if self.allowed_headers.allows_all() || requested.is_empty() {
            if let Ok(value) = HeaderValue::from_str(requested) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
            }
        } else if !self.allowed_headers.is_empty() {
            let allowed = self.allowed_headers.filter(requested);
            if !allowed.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&allowed) {
                    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
                }
            }
        }

        if let Some(max_age) = &self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }

        if self.debug {
            headers.insert(X_CORS_DEBUG, HeaderValue::from_static("Preflight response"));
        }
        tracing::debug!(origin = %origin, passthrough = self.options_passthrough, "CORS preflight");

        if self.options_passthrough {
            CorsDecision::Forward { headers }
        } else {
            CorsDecision::Preflight { headers }
        }
    }
}

/// Merge CORS headers into a response produced by the inner handler. Values
/// the handler already set win, except `Vary`, which is appended.
pub fn merge_headers(response_headers: &mut HeaderMap, cors_headers: HeaderMap) {
    let mut current = None;
    for (name, value) in cors_headers {
        if let Some(name) = name {
            current = Some(name);
        }
        let Some(name) = current.clone() else {
            continue;
        };
        if name == header::VARY {
            response_headers.append(name, value);
        } else if !response_headers.contains_key(&name) {
            response_headers.insert(name, value);
        }
    }
}

fn joined_header_value(field: &str, values: &[String]) -> Option<HeaderValue> {
    if values.is_empty() {
        return None;
    }
    match HeaderValue::from_str(&values.join(", ")) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(field, error = %e, "Ignoring CORS list that is not a valid header value");
            None
        }
    }
}
