//! Freezer configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Configuration of the freezer, which moves canonical blocks into the
/// ancient store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FreezerConfig {
    /// Number of most recent blocks kept out of the ancient store.
    #[serde(default = "default_freeze_threshold")]
    pub freeze_threshold: u64,
    /// Blocks frozen per ancient-store commit. Must be >= 1.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Delete frozen block records from the current tier once the ancient
    /// commit is durable.
    #[serde(default)]
    pub prune_source: bool,
}

#[bon::bon]
impl FreezerConfig {
    /// Creates a new freezer configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `batch_size` is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_freeze_threshold())] freeze_threshold: u64,
        #[builder(default = default_batch_size())] batch_size: u64,
        #[builder(default)] prune_source: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self { freeze_threshold, batch_size, prune_source };
        config.validate()?;
        Ok(config)
    }
}

impl FreezerConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `batch_size` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation {
                message: "batch_size must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for FreezerConfig {
    fn default() -> Self {
        Self {
            freeze_threshold: default_freeze_threshold(),
            batch_size: default_batch_size(),
            prune_source: false,
        }
    }
}

fn default_freeze_threshold() -> u64 {
    90_000
}

fn default_batch_size() -> u64 {
    2_000
}
