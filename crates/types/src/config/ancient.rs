//! Ancient store configuration.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, StoreConfig};

/// Separator between a table name and the item index in physical keys.
pub const ANCIENT_KEY_SEPARATOR: u8 = b':';

/// Table holding block headers.
pub const HEADERS_TABLE: &str = "headers";
/// Table holding canonical block hashes.
pub const HASHES_TABLE: &str = "hashes";
/// Table holding block bodies.
pub const BODIES_TABLE: &str = "bodies";
/// Table holding block receipts.
pub const RECEIPTS_TABLE: &str = "receipts";
/// Table holding total difficulties.
pub const DIFFICULTIES_TABLE: &str = "difficulties";

/// Configuration of an ancient store.
///
/// # Validation Rules
///
/// - `tables` must be non-empty
/// - table names must be non-empty, unique, and must not contain `:`
/// - `store` must itself be valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AncientConfig {
    /// Names of the tables the store manages. All tables advance in lockstep.
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,
    /// Settings of the underlying key-value store.
    #[serde(default)]
    pub store: StoreConfig,
}

#[bon::bon]
impl AncientConfig {
    /// Creates a new ancient store configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the table list is empty, contains
    /// duplicates or malformed names, or if the store settings are invalid.
    #[builder]
    pub fn new(
        #[builder(default = default_tables())] tables: Vec<String>,
        #[builder(default)] store: StoreConfig,
    ) -> Result<Self, ConfigError> {
        let config = Self { tables, store };
        config.validate()?;
        Ok(config)
    }
}

impl AncientConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.is_empty() {
            return Err(ConfigError::Validation {
                message: "tables must name at least one table".to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(self.tables.len());
        for name in &self.tables {
            if name.is_empty() || name.as_bytes().contains(&ANCIENT_KEY_SEPARATOR) {
                return Err(ConfigError::Validation {
                    message: format!(
                        "table name {name:?} must be non-empty and must not contain ':'"
                    ),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Validation {
                    message: format!("table name {name:?} is listed more than once"),
                });
            }
        }
        self.store.validate()
    }
}

impl Default for AncientConfig {
    fn default() -> Self {
        Self { tables: default_tables(), store: StoreConfig::default() }
    }
}

fn default_tables() -> Vec<String> {
    [HEADERS_TABLE, HASHES_TABLE, BODIES_TABLE, RECEIPTS_TABLE, DIFFICULTIES_TABLE]
        .iter()
        .map(|name| (*name).to_string())
        .collect()
}
