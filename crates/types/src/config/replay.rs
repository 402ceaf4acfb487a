//! Replayer configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Configuration of a replay run.
///
/// # Validation Rules
///
/// - `batch_size` must be >= 1
/// - `commit_interval` must be >= 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReplayConfig {
    /// Heights covered by one checkpointed batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Heights written per intermediate commit inside a batch. Bounds the size
    /// of a single write transaction when `batch_size` is large.
    #[serde(default = "default_commit_interval")]
    pub commit_interval: u64,
    /// Check hash and parent-hash invariants of every block.
    #[serde(default = "default_verify_blocks")]
    pub verify_blocks: bool,
    /// Log and skip blocks that fail to read or verify instead of aborting.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Stop after this height. `None` replays up to the source tip.
    #[serde(default)]
    pub max_height: Option<u64>,
}

#[bon::bon]
impl ReplayConfig {
    /// Creates a new replay configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `batch_size` or
    /// `commit_interval` is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_batch_size())] batch_size: u64,
        #[builder(default = default_commit_interval())] commit_interval: u64,
        #[builder(default = default_verify_blocks())] verify_blocks: bool,
        #[builder(default)] continue_on_error: bool,
        max_height: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let config =
            Self { batch_size, commit_interval, verify_blocks, continue_on_error, max_height };
        config.validate()?;
        Ok(config)
    }
}

impl ReplayConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation {
                message: "batch_size must be >= 1".to_string(),
            });
        }
        if self.commit_interval == 0 {
            return Err(ConfigError::Validation {
                message: "commit_interval must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            commit_interval: default_commit_interval(),
            verify_blocks: default_verify_blocks(),
            continue_on_error: false,
            max_height: None,
        }
    }
}

fn default_batch_size() -> u64 {
    1000
}

fn default_commit_interval() -> u64 {
    100
}

fn default_verify_blocks() -> bool {
    true
}
