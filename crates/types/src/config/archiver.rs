//! Archiver configuration.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum interval between archiver cycles.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration of the background archiver.
///
/// # Validation Rules
///
/// - `interval` must be >= 10ms
/// - `chunk_size` must be >= 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArchiverConfig {
    /// Number of trailing blocks treated as not yet final.
    #[serde(default = "default_finality_delay")]
    pub finality_delay: u64,
    /// Interval between archiver cycles.
    #[serde(default = "default_interval")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub interval: Duration,
    /// Keys copied per archive commit. Each chunk is deleted from the current
    /// tier only after its archive commit is durable.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[bon::bon]
impl ArchiverConfig {
    /// Creates a new archiver configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `interval` < 10ms or
    /// `chunk_size` is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_finality_delay())] finality_delay: u64,
        #[builder(default = default_interval())] interval: Duration,
        #[builder(default = default_chunk_size())] chunk_size: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { finality_delay, interval, chunk_size };
        config.validate()?;
        Ok(config)
    }
}

impl ArchiverConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::Validation {
                message: format!("interval must be >= {:?}, got {:?}", MIN_INTERVAL, self.interval),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Validation {
                message: "chunk_size must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            finality_delay: default_finality_delay(),
            interval: default_interval(),
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_finality_delay() -> u64 {
    32
}

fn default_interval() -> Duration {
    Duration::from_secs(3600) // 1 hour
}

fn default_chunk_size() -> usize {
    100
}
