use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::DispatcherConfig;

/// Load configuration from a file using the config crate.
/// Supports YAML, JSON and TOML, picked by extension (YAML otherwise).
///
/// Values can be overridden with `WAYMARK__`-prefixed environment variables,
/// e.g. `WAYMARK__LISTEN_ADDR=0.0.0.0:9000`.
pub fn load_config(config_path: impl AsRef<Path>) -> Result<DispatcherConfig> {
    let config_path = config_path.as_ref();

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix("WAYMARK").separator("__"))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let dispatcher_config: DispatcherConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    tracing::debug!(path = %config_path.display(), "Configuration loaded");
    Ok(dispatcher_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::MissingKeyPolicy;

    #[test]
    fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
cors:
  allowed_origins: ["https://*.example.com"]
  allow_credentials: true
  max_age: 600
throttle:
  limit: 16
rate_limit:
  interval: "500ms"
  on_missing_key: deny
required_env: ["DATABASE_URL"]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{yaml_content}").unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        let cors = config.cors.unwrap();
        assert_eq!(cors.allowed_origins, vec!["https://*.example.com"]);
        assert_eq!(cors.max_age, 600);
        assert!(cors.allowed_methods.is_empty());
        assert_eq!(config.throttle.unwrap().limit, 16);
        let rate_limit = config.rate_limit.unwrap();
        assert_eq!(rate_limit.interval, "500ms");
        assert_eq!(rate_limit.on_missing_key, MissingKeyPolicy::Deny);
        assert_eq!(rate_limit.status_code, 429);
        assert_eq!(config.required_env, vec!["DATABASE_URL"]);
    }

    #[test]
    fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "0.0.0.0:8081"
recover_panics = false

[logging]
level = "debug"
json = true
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{toml_content}").unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8081");
        assert!(!config.recover_panics);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert!(config.logging.request_log);
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_config("/definitely/not/here/waymark.yaml");
        assert!(result.is_err());
    }
}
