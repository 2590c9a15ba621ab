//! Registry configuration.
//!
//! Supports YAML file and environment variable overrides.

use std::time::Duration;

use serde::Deserialize;

use crate::storage::schema::TableName;

/// Default configuration file name (without extension).
pub const DEFAULT_CONFIG_FILE: &str = "subreg";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SUBREG_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SUBREG";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SUBREG_LOG";

/// Default cache time-to-live: one hour.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;

/// Subscription registry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Database the registry stores subscriptions in. Also decides which
    /// ambient connections may be reused; when unset, any open ambient
    /// connection is.
    pub connection_string: Option<String>,
    /// Subscriptions table.
    pub table_name: TableName,
    /// This registry's own publisher endpoint.
    pub endpoint: String,
    /// Create the table on first use.
    pub auto_create_table: bool,
    /// Maximum age of the cached subscription snapshot, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            table_name: TableName::default(),
            endpoint: String::new(),
            auto_create_table: true,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl RegistryConfig {
    /// Configuration for `endpoint` with every other option at its default.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `subreg.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check the options a registry cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Publisher endpoint is not configured")]
    MissingEndpoint,

    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),
}
