//! # Configuration
//!
//! Settings for the queue reader, the message processor and the queue backend.
//!
//! Values are layered by [`ConfigManager`]: built-in defaults, then an
//! optional TOML/YAML file, then `INGEST_*` environment variables
//! (`INGEST_QUEUE__VISIBILITY_TIMEOUT_SECONDS=600`).

pub mod error;
pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    pub queue: QueueConfig,
    pub workers: WorkerConfig,
    pub database: DatabaseConfig,
}

/// Queue polling and message lifecycle settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    /// Lease length. The keepalive renews every half of this.
    pub visibility_timeout_seconds: u64,
    /// Receive count at which a failing message is dropped. 0 disables the guard.
    pub max_receive_count: i64,
    pub max_messages_per_receive: usize,
    pub poll_interval_ms: u64,
    pub receive_error_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: defaults::QUEUE_NAME.to_string(),
            visibility_timeout_seconds: defaults::VISIBILITY_TIMEOUT_SECONDS,
            max_receive_count: defaults::MAX_RECEIVE_COUNT,
            max_messages_per_receive: defaults::MAX_MESSAGES_PER_RECEIVE,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            receive_error_backoff_ms: defaults::RECEIVE_ERROR_BACKOFF_MS,
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn receive_error_backoff(&self) -> Duration {
        Duration::from_millis(self.receive_error_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of messages processed concurrently
    pub number_of_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            number_of_workers: defaults::NUMBER_OF_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// pgmq connection string
    pub url: Option<String>,
}

impl IngestConfig {
    /// Validate configuration consistency and required fields
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue.name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "queue.name",
                "queue configuration",
            ));
        }

        let vt = self.queue.visibility_timeout_seconds;
        if !(defaults::MIN_VISIBILITY_TIMEOUT_SECONDS..=defaults::MAX_VISIBILITY_TIMEOUT_SECONDS)
            .contains(&vt)
        {
            return Err(ConfigurationError::invalid_value(
                "queue.visibility_timeout_seconds",
                vt,
                format!(
                    "visibility timeout must be between {} and {} seconds",
                    defaults::MIN_VISIBILITY_TIMEOUT_SECONDS,
                    defaults::MAX_VISIBILITY_TIMEOUT_SECONDS
                ),
            ));
        }

        if self.queue.max_receive_count < 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.max_receive_count",
                self.queue.max_receive_count,
                "max receive count must be 0 (disabled) or positive",
            ));
        }

        let max_messages = self.queue.max_messages_per_receive;
        if !(1..=defaults::MAX_MESSAGES_PER_RECEIVE).contains(&max_messages) {
            return Err(ConfigurationError::invalid_value(
                "queue.max_messages_per_receive",
                max_messages,
                format!(
                    "must be between 1 and {}",
                    defaults::MAX_MESSAGES_PER_RECEIVE
                ),
            ));
        }

        if self.workers.number_of_workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "workers.number_of_workers",
                "0",
                "number of workers must be greater than 0",
            ));
        }

        Ok(())
    }
}
