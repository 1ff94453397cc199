//! Application configuration.
//!
//! An immutable `Config` is built once at process start from defaults,
//! an optional YAML file, and KEYWATCH-prefixed environment variables.
//! Components receive it by reference and never read the environment
//! themselves.

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "keywatch.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "KEYWATCH_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "KEYWATCH";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "KEYWATCH_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Label identifying this Redis deployment in recorded events.
    /// Also selects the sink table name.
    pub instance: String,
    /// Redis (source) configuration.
    pub source: SourceConfig,
    /// ClickHouse (sink) configuration.
    pub sink: SinkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance: "redis".to_string(),
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Redis connection URL (e.g., redis://localhost:6379).
    pub url: String,
    /// Password for AUTH, if the server requires one.
    pub password: Option<String>,
    /// Logical database index for enrichment reads.
    pub db: i64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            password: None,
            db: 0,
        }
    }
}

/// ClickHouse connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// ClickHouse HTTP endpoint (e.g., http://localhost:8123).
    pub url: String,
    /// Target database name.
    pub database: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "redis_tracking".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `keywatch.yaml` in the current directory (if it exists)
    /// 2. File specified by the `KEYWATCH_CONFIG` environment variable (if set)
    /// 3. Environment variables with the `KEYWATCH` prefix, `__` separated
    ///    (e.g. `KEYWATCH__SOURCE__URL`, `KEYWATCH__INSTANCE`)
    pub fn load() -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.instance, "redis");
        assert_eq!(config.source.url, "redis://localhost:6379");
        assert_eq!(config.source.db, 0);
        assert!(config.source.password.is_none());
        assert_eq!(config.sink.url, "http://localhost:8123");
        assert_eq!(config.sink.database, "redis_tracking");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
instance: cache-prod

source:
  url: redis://redis.internal:6379
  password: hunter2
  db: 2

sink:
  database: tracking
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.instance, "cache-prod");
        assert_eq!(config.source.url, "redis://redis.internal:6379");
        assert_eq!(config.source.password.as_deref(), Some("hunter2"));
        assert_eq!(config.source.db, 2);
        // Unset fields fall back to defaults
        assert_eq!(config.sink.url, "http://localhost:8123");
        assert_eq!(config.sink.database, "tracking");
    }
}
