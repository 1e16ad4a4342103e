//! Application configuration.
//!
//! Aggregates storage and ledger settings into a single Config struct that
//! can be loaded from YAML files or environment variables.

mod ledger;
mod storage;

pub use ledger::{GainBase, LedgerConfig};
pub use storage::{StorageConfig, StorageType, DEFAULT_SQLITE_PATH};

use serde::Deserialize;

use crate::model::{tiers_from_fractions, validate_tiers};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LEDGER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LEDGER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LEDGER_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Ledger arithmetic, locking and ratio defaults.
    pub ledger: LedgerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `LEDGER__STORAGE__PATH`
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

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, without environment overrides.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the ledger cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ledger = &self.ledger;
        if ledger.point_value <= rust_decimal::Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "ledger.point_value must be positive, got {}",
                ledger.point_value
            )));
        }
        if ledger.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ledger.lock_timeout_ms must be positive".into(),
            ));
        }
        if ledger.history_page_limit <= 0 {
            return Err(ConfigError::Invalid(
                "ledger.history_page_limit must be positive".into(),
            ));
        }
        validate_tiers(&tiers_from_fractions(&ledger.default_ratios))
            .map_err(|e| ConfigError::Invalid(format!("ledger.default_ratios: {e}")))?;
        if self.storage.storage_type == StorageType::Sqlite && self.storage.path.trim().is_empty()
        {
            return Err(ConfigError::Invalid("storage.path is empty".into()));
        }
        Ok(())
    }

    /// In-memory configuration for tests.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                storage_type: StorageType::Memory,
                ..StorageConfig::default()
            },
            ledger: LedgerConfig::default(),
        }
    }
}
