//! Client configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sftpdir_transfer::DEFAULT_CHUNK_SIZE;

/// Default number of transfer tasks in flight.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

/// Errors from loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings shared by every operation of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Maximum transfer tasks in flight during a bulk operation.
    #[serde(alias = "promiseLimit")]
    pub concurrency_limit: usize,
    /// Use bulk read/write primitives for file tasks by default.
    pub use_accelerated_transfer: bool,
    /// Buffer size for stream copies and accelerated chunks.
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            use_accelerated_transfer: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    /// Parses and validates a JSON document. Missing fields take their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Invalid(
                "concurrencyLimit must be a positive integer".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunkSize must be a positive integer".into(),
            ));
        }
        Ok(())
    }
}
