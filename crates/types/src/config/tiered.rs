//! Tiered database configuration: current tier, archive tier, ancient store.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, StoreConfig};

/// How this process holds the archive tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveMode {
    /// Read-write handle owned by this process. The archiver migrates into it.
    #[default]
    Owned,
    /// Read-only handle on a shared lock. Other processes may hold the same
    /// path open for reading; migration is refused.
    Shared,
}

/// Configuration of a tiered (current + archive) database.
///
/// # Validation Rules
///
/// - `current_path` must be non-empty
/// - `archive_path` and `ancient_path`, when set, must differ from each other
///   and from `current_path`
///
/// # Example
///
/// ```no_run
/// # use tierdb_types::config::{ArchiveMode, TieredConfig};
/// let config = TieredConfig::builder()
///     .current_path("/var/lib/chain/current.redb")
///     .archive_path("/var/lib/chain/archive.redb")
///     .archive_mode(ArchiveMode::Shared)
///     .build()
///     .expect("valid tiered config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TieredConfig {
    /// Path of the read-write current tier.
    pub current_path: PathBuf,
    /// Path of the archive tier. `None` runs in single-tier mode.
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
    /// How the archive tier is opened.
    #[serde(default)]
    pub archive_mode: ArchiveMode,
    /// Path of the ancient store, if one is attached.
    #[serde(default)]
    pub ancient_path: Option<PathBuf>,
    /// Settings applied to every store handle opened for this database.
    #[serde(default)]
    pub store: StoreConfig,
}

#[bon::bon]
impl TieredConfig {
    /// Creates a new tiered database configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a path is empty or two tiers
    /// share a path.
    #[builder]
    pub fn new(
        #[builder(into)] current_path: PathBuf,
        #[builder(into)] archive_path: Option<PathBuf>,
        #[builder(default)] archive_mode: ArchiveMode,
        #[builder(into)] ancient_path: Option<PathBuf>,
        #[builder(default)] store: StoreConfig,
    ) -> Result<Self, ConfigError> {
        let config = Self { current_path, archive_path, archive_mode, ancient_path, store };
        config.validate()?;
        Ok(config)
    }
}

impl TieredConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.current_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: "current_path must not be empty".to_string(),
            });
        }
        let paths =
            [Some(&self.current_path), self.archive_path.as_ref(), self.ancient_path.as_ref()];
        for (i, a) in paths.iter().enumerate() {
            let Some(a) = a else { continue };
            if a.as_os_str().is_empty() {
                return Err(ConfigError::Validation {
                    message: "archive_path and ancient_path must not be empty when set".to_string(),
                });
            }
            for b in paths.iter().skip(i + 1).flatten() {
                if a == b {
                    return Err(ConfigError::Validation {
                        message: format!(
                            "tiers must use distinct paths, {} is used twice",
                            a.display()
                        ),
                    });
                }
            }
        }
        self.store.validate()
    }
}
