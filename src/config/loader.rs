//! Configuration Loader
//!
//! Layers built-in defaults, an optional configuration file and `INGEST_*`
//! environment variables with the `config` crate, then validates the result.

use std::path::Path;
use std::sync::Arc;

use config::{Config, Environment, File};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::IngestConfig;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "INGEST";
/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Validated configuration shared by the reader and its workers
#[derive(Debug)]
pub struct ConfigManager {
    config: IngestConfig,
}

impl ConfigManager {
    /// Load configuration from defaults and environment variables only
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let config = Self::build(None)?;
        Self::from_config(config)
    }

    /// Load configuration from a TOML or YAML file (format chosen by extension)
    /// with environment variable overrides applied on top
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        debug!("Loading configuration from file: {}", path.display());

        let config = Self::build(Some(path))?;
        Self::from_config(config)
    }

    /// Wrap an already constructed configuration
    pub fn from_config(config: IngestConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;

        // The connection string may carry credentials
        info!(
            queue = %config.queue.name,
            visibility_timeout_seconds = config.queue.visibility_timeout_seconds,
            max_receive_count = config.queue.max_receive_count,
            number_of_workers = config.workers.number_of_workers,
            database_configured = config.database.url.is_some(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager { config }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    fn build(path: Option<&Path>) -> ConfigResult<IngestConfig> {
        let defaults = Config::try_from(&IngestConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::load_error(
                    path.display().to_string(),
                    "file does not exist",
                ));
            }
            builder = builder.add_source(File::from(path));
        }

        let merged = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                let source_name = path
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "environment".to_string());
                ConfigurationError::load_error(source_name, e)
            })?;

        merged
            .try_deserialize::<IngestConfig>()
            .map_err(ConfigurationError::deserialization_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = IngestConfig::default();
        config.workers.number_of_workers = 0;
        assert!(ConfigManager::from_config(config).is_err());
    }

    #[test]
    fn test_missing_file_is_a_load_error() {
        let err = ConfigManager::load_from_file("/nonexistent/ingest.toml").unwrap_err();
        assert!(matches!(err, ConfigurationError::LoadError { .. }));
    }
}
