use std::net::SocketAddr;

use http::{HeaderName, Method, StatusCode};

use crate::config::models::{CorsConfig, DispatcherConfig, RateLimitConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Dispatcher configuration validator. Collects every problem instead of
/// stopping at the first one.
pub struct DispatcherConfigValidator;

impl DispatcherConfigValidator {
    /// Validate the entire configuration
    pub fn validate(config: &DispatcherConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Some(throttle) = &config.throttle {
            if throttle.limit == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "throttle.limit".to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if let Some(rate_limit) = &config.rate_limit {
            errors.extend(Self::validate_rate_limit(rate_limit));
        }

        if let Some(cors) = &config.cors {
            errors.extend(Self::validate_cors(cors));
        }

        for (i, name) in config.required_env.iter().enumerate() {
            if name.trim().is_empty() || name.contains('=') {
                errors.push(ValidationError::InvalidField {
                    field: format!("required_env[{i}]"),
                    message: format!("'{name}' is not a valid environment variable name"),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_rate_limit(config: &RateLimitConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        match humantime::parse_duration(&config.interval) {
            Ok(interval) if interval.is_zero() => errors.push(ValidationError::InvalidField {
                field: "rate_limit.interval".to_string(),
                message: "Must be greater than zero".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidField {
                field: "rate_limit.interval".to_string(),
                message: format!("'{}' is not a duration like \"1s\" or \"500ms\": {e}", config.interval),
            }),
        }

        if config.capacity == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.capacity".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if StatusCode::from_u16(config.status_code).is_err() {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.status_code".to_string(),
                message: format!("{} is not an HTTP status code", config.status_code),
            });
        }

        errors
    }

    fn validate_cors(config: &CorsConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for origin in &config.allowed_origins {
            if origin.trim().is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: "cors.allowed_origins".to_string(),
                    message: "Origins must not be empty".to_string(),
                });
            } else if origin != "*" && origin.matches('*').count() > 1 {
                tracing::warn!(
                    origin = %origin,
                    "CORS origin has more than one '*' and will only match literally"
                );
            }
        }

        for method in &config.allowed_methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "cors.allowed_methods".to_string(),
                    message: format!("'{method}' is not an HTTP method"),
                });
            }
        }

        for (field, headers) in [
            ("cors.allowed_headers", &config.allowed_headers),
            ("cors.exposed_headers", &config.exposed_headers),
        ] {
            for name in headers {
                if name != "*" && HeaderName::from_bytes(name.as_bytes()).is_err() {
                    errors.push(ValidationError::InvalidField {
                        field: field.to_string(),
                        message: format!("'{name}' is not a valid header name"),
                    });
                }
            }
        }

        if config.allow_credentials && config.allowed_origins.iter().any(|origin| origin == "*") {
            tracing::warn!(
                "CORS allows every origin with credentials; origins will be echoed back individually"
            );
        }

        errors
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
