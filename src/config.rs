//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::query::DEFAULT_MAX_RESULTS;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dataset and review storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Review file; relative paths resolve against `data_dir`
    #[serde(default = "default_reviews_file")]
    pub reviews_file: String,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("campus-insight").to_string_lossy().to_string())
        .unwrap_or_else(|| "./insight_data".to_string())
}

fn default_reviews_file() -> String {
    "room_reviews.json".to_string()
}

impl StorageConfig {
    /// Absolute or `data_dir`-relative path of the review file
    pub fn reviews_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.reviews_file);
        if path.is_absolute() {
            path
        } else {
            Path::new(&self.data_dir).join(path)
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            reviews_file: default_reviews_file(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4321
}

fn default_max_body_size() -> usize {
    64 * 1024 * 1024 // 64 MB
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_body_size: default_max_body_size(),
        }
    }
}

/// Query engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Largest filtered-record or group count a query may produce
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("campus-insight").join("config.toml")),
            Some(PathBuf::from("/etc/campus-insight/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(data_dir) = var("INSIGHT_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        // API overrides
        if let Some(host) = var("INSIGHT_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("INSIGHT_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Query overrides
        if let Some(max) = var("INSIGHT_MAX_RESULTS") {
            if let Ok(m) = max.parse() {
                self.query.max_results = m;
            }
        }

        // Logging overrides
        if let Some(level) = var("INSIGHT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("INSIGHT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Campus Insight Configuration
#
# Environment variables override these settings:
# - INSIGHT_DATA_DIR
# - INSIGHT_API_HOST
# - INSIGHT_API_PORT
# - INSIGHT_MAX_RESULTS
# - INSIGHT_LOG_LEVEL
# - INSIGHT_LOG_FORMAT

[storage]
# Directory holding one JSON file per dataset
data_dir = "~/.local/share/campus-insight"

# Room review file (relative to data_dir unless absolute)
reviews_file = "room_reviews.json"

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 4321

# Allowed CORS origins (empty allows any origin)
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

# Largest accepted request body in bytes (dataset uploads)
max_body_size = 67108864

[query]
# Queries whose filtered records (or groups) exceed this fail
max_results = 5000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.port, 4321);
        assert_eq!(config.query.max_results, 5000);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            port = 9000

            [query]
            max_results = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.query.max_results, 10);
        assert_eq!(config.storage.reviews_file, "room_reviews.json");
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.api.port, 4321);
        assert_eq!(config.query.max_results, 5000);
        assert_eq!(config.api.cors_origins.len(), 2);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("INSIGHT_DATA_DIR", "/tmp/insight"),
            ("INSIGHT_API_PORT", "8080"),
            ("INSIGHT_MAX_RESULTS", "not a number"),
            ("INSIGHT_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.data_dir, "/tmp/insight");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.query.max_results, 5000);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_reviews_path() {
        let mut storage = StorageConfig {
            data_dir: "/data".to_string(),
            reviews_file: "reviews.json".to_string(),
        };
        assert_eq!(storage.reviews_path(), PathBuf::from("/data/reviews.json"));

        storage.reviews_file = "/var/reviews.json".to_string();
        assert_eq!(storage.reviews_path(), PathBuf::from("/var/reviews.json"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api\nport = ").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
