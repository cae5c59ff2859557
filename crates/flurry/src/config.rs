//! Writer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cap::Cap;
use crate::error::ConfigError;
pub use flurry_core::{KB, MB};

/// Batch limits shared by every writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriterConfig {
    /// Maximum rows per batch. Zero removes the limit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum estimated bytes per batch. Zero removes the limit.
    #[serde(default = "default_batch_size_bytes")]
    pub batch_size_bytes: usize,
    /// Idle time after which a non-empty batch is flushed. Zero disables it.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    10_000
}

fn default_batch_size_bytes() -> usize {
    5 * MB
}

fn default_batch_timeout_ms() -> u64 {
    20_000
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_size_bytes: default_batch_size_bytes(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl WriterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: WriterConfig = flurry_core::load_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: WriterConfig = flurry_core::parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would let a batch grow without bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 && self.batch_size_bytes == 0 && self.batch_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_timeout_ms",
                message: "an idle timeout is required when both batch size limits are disabled"
                    .into(),
            });
        }
        Ok(())
    }

    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows;
        self
    }

    pub fn with_batch_size_bytes(mut self, bytes: usize) -> Self {
        self.batch_size_bytes = bytes;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// A fresh budget with this configuration's limits.
    pub fn cap(&self) -> Cap {
        Cap::new(self.batch_size_bytes, self.batch_size)
    }

    /// The idle flush timeout, or `None` when idle flushing is disabled.
    pub fn batch_timeout(&self) -> Option<Duration> {
        (self.batch_timeout_ms > 0).then(|| Duration::from_millis(self.batch_timeout_ms))
    }
}
