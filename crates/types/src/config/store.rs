//! Key-value store configuration: backend cache and background reclamation.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum cache size: 1 MB.
const MIN_CACHE_SIZE_BYTES: usize = 1024 * 1024;

/// Minimum interval between reclamation cycles.
const MIN_RECLAIM_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration of a single key-value store handle.
///
/// # Validation Rules
///
/// - `cache_size_bytes` must be >= 1 MB (1,048,576 bytes)
/// - `reclaim_interval` must be >= 10ms
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use tierdb_types::config::StoreConfig;
/// let config = StoreConfig::builder()
///     .cache_size_bytes(128 * 1024 * 1024)
///     .reclaim_interval(Duration::from_secs(600))
///     .build()
///     .expect("valid store config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// Page cache size handed to the backend, in bytes.
    #[serde(default = "default_cache_size")]
    pub cache_size_bytes: usize,
    /// Whether read-write handles run the periodic reclamation cycle.
    #[serde(default = "default_reclaim_enabled")]
    pub reclaim_enabled: bool,
    /// Interval between reclamation (compaction) cycles.
    #[serde(default = "default_reclaim_interval")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub reclaim_interval: Duration,
}

#[bon::bon]
impl StoreConfig {
    /// Creates a new store configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `cache_size_bytes` < 1 MB
    /// - `reclaim_interval` < 10ms
    #[builder]
    pub fn new(
        #[builder(default = default_cache_size())] cache_size_bytes: usize,
        #[builder(default = default_reclaim_enabled())] reclaim_enabled: bool,
        #[builder(default = default_reclaim_interval())] reclaim_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { cache_size_bytes, reclaim_enabled, reclaim_interval };
        config.validate()?;
        Ok(config)
    }
}

impl StoreConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size_bytes < MIN_CACHE_SIZE_BYTES {
            return Err(ConfigError::Validation {
                message: format!(
                    "cache_size_bytes must be >= {} (1 MB), got {}",
                    MIN_CACHE_SIZE_BYTES, self.cache_size_bytes
                ),
            });
        }
        if self.reclaim_interval < MIN_RECLAIM_INTERVAL {
            return Err(ConfigError::Validation {
                message: format!(
                    "reclaim_interval must be >= {:?}, got {:?}",
                    MIN_RECLAIM_INTERVAL, self.reclaim_interval
                ),
            });
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_size_bytes: default_cache_size(),
            reclaim_enabled: default_reclaim_enabled(),
            reclaim_interval: default_reclaim_interval(),
        }
    }
}

fn default_cache_size() -> usize {
    64 * 1024 * 1024 // 64 MB
}

fn default_reclaim_enabled() -> bool {
    true
}

fn default_reclaim_interval() -> Duration {
    Duration::from_secs(300) // 5 minutes
}
