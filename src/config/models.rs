//! Configuration data structures for waymark.
//!
//! These types map directly to YAML / JSON / TOML configuration files. They are
//! serde-friendly and carry defaults so that minimal configs remain concise.
//! Every middleware section is optional; leaving it out keeps that layer off.
use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}

/// Top-level configuration consumed by the `waymark` binary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DispatcherConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: Option<CorsConfig>,
    #[serde(default)]
    pub throttle: Option<ThrottleConfig>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Environment variables that must be set (and non-empty) for requests
    /// to be served.
    #[serde(default)]
    pub required_env: Vec<String>,
    /// Install the panic-recovery middleware outermost.
    #[serde(default = "default_true")]
    pub recover_panics: bool,
}

impl DispatcherConfig {
    /// Create a new configuration builder
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::default()
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            logging: LoggingConfig::default(),
            cors: None,
            throttle: None,
            rate_limit: None,
            required_env: Vec::new(),
            recover_panics: true,
        }
    }
}

/// Builder for [`DispatcherConfig`].
#[derive(Default)]
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl DispatcherConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = Some(cors);
        self
    }

    /// Bound the number of concurrently executing handlers.
    pub fn throttle(mut self, limit: usize) -> Self {
        self.config.throttle = Some(ThrottleConfig { limit });
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = Some(rate_limit);
        self
    }

    /// Add a variable to the required environment list.
    pub fn require_env(mut self, name: impl Into<String>) -> Self {
        self.config.required_env.push(name.into());
        self
    }

    pub fn recover_panics(mut self, enabled: bool) -> Self {
        self.config.recover_panics = enabled;
        self
    }

    pub fn build(self) -> Result<DispatcherConfig, String> {
        if self.config.listen_addr.is_empty() {
            return Err("listen_addr is required".to_string());
        }
        if let Some(throttle) = &self.config.throttle {
            if throttle.limit == 0 {
                return Err("throttle limit must be greater than 0".to_string());
            }
        }
        Ok(self.config)
    }
}

/// Logging output settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `waymark=debug,info`.
    pub level: String,
    /// Emit JSON lines instead of the pretty console format.
    pub json: bool,
    /// Install the per-request logging middleware.
    pub request_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            request_log: true,
        }
    }
}

/// Cross-origin resource sharing policy.
///
/// Field defaults are the zero values; the negotiator fills in `["*"]` for
/// empty `allowed_origins` and `GET, POST, HEAD` for empty `allowed_methods`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origins, `*` for all, or patterns with one `*`
    /// (`https://*.example.com`).
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    /// Request headers allowed on preflight; `*` allows whatever is asked.
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    /// Preflight cache lifetime in seconds; `0` omits the header.
    pub max_age: u64,
    pub allow_credentials: bool,
    /// Let the inner handler process OPTIONS instead of answering 204.
    pub options_passthrough: bool,
    /// Add `X-CORS-Debug` response headers.
    pub debug: bool,
}

impl CorsConfig {
    /// All origins, the common methods, any header, no credentials.
    pub fn permissive() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            allowed_headers: vec!["*".to_string()],
            ..Self::default()
        }
    }

    /// [`CorsConfig::permissive`] restricted to `origins`, with credentials.
    pub fn strict<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            allow_credentials: true,
            ..Self::permissive()
        }
    }
}

/// Global concurrency bound.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub limit: usize,
}

/// Behaviour when a client identity could not be extracted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    #[default]
    Allow,
    Deny,
}

fn default_interval() -> String {
    "1s".to_string()
}

fn default_capacity() -> usize {
    10_000
}

fn default_status_code() -> u16 {
    429
}

fn default_message() -> String {
    "Too many requests".to_string()
}

/// Per-client minimum interval between accepted requests.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Parsed by humantime, e.g. "1s", "500ms".
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Tracked identities before stale entries are swept.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default)]
    pub on_missing_key: MissingKeyPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            capacity: default_capacity(),
            status_code: default_status_code(),
            message: default_message(),
            on_missing_key: MissingKeyPolicy::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_zero_throttle() {
        let result = DispatcherConfig::builder().throttle(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_collects_sections() {
        let config = DispatcherConfig::builder()
            .listen_addr("0.0.0.0:9000")
            .cors(CorsConfig::strict(["https://app.example.com"]))
            .throttle(8)
            .rate_limit(RateLimitConfig::default())
            .require_env("DATABASE_URL")
            .build()
            .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.throttle, Some(ThrottleConfig { limit: 8 }));
        assert_eq!(config.required_env, vec!["DATABASE_URL"]);
        let cors = config.cors.unwrap();
        assert!(cors.allow_credentials);
        assert_eq!(cors.allowed_headers, vec!["*"]);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config: DispatcherConfig = serde_json::from_str(r#"{"rate_limit": {}}"#).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert!(config.recover_panics);
        assert_eq!(config.rate_limit, Some(RateLimitConfig::default()));
        assert!(config.cors.is_none());
    }
}
