//! Configuration types for the tierdb storage engine.
//!
//! Configuration is typically deserialized from TOML or JSON by the embedding
//! application. All config structs validate their values at construction time
//! via fallible builders. Post-deserialization validation is available via
//! the `validate()` method on each struct.

// The schemars `JsonSchema` derive macro internally uses `.unwrap()` in its
// expansions. Allow `disallowed_methods` at the module level since config
// types are declarative structs with minimal procedural code.
#![allow(clippy::disallowed_methods)]

mod ancient;
mod archiver;
mod freezer;
mod replay;
mod store;
mod tiered;

pub use ancient::*;
pub use archiver::*;
pub use freezer::*;
pub use replay::*;
use snafu::Snafu;
pub use store::*;
pub use tiered::*;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use super::*;

    // =========================================================================
    // StoreConfig
    // =========================================================================

    #[test]
    fn test_store_config_defaults_are_valid() {
        let config = StoreConfig::builder().build().expect("defaults should be valid");
        assert_eq!(config.cache_size_bytes, 64 * 1024 * 1024);
        assert!(config.reclaim_enabled);
        assert_eq!(config.reclaim_interval, Duration::from_secs(300));
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_store_config_cache_size_minimum() {
        let result = StoreConfig::builder().cache_size_bytes(1024 * 1024).build();
        assert!(result.is_ok());

        let err = StoreConfig::builder().cache_size_bytes(1024 * 1024 - 1).build().unwrap_err();
        assert!(err.to_string().contains("cache_size_bytes"));
    }

    #[test]
    fn test_store_config_reclaim_interval_minimum() {
        let err = StoreConfig::builder().reclaim_interval(Duration::from_millis(1)).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_store_config_humantime_roundtrip() {
        let config = StoreConfig::builder()
            .reclaim_interval(Duration::from_secs(90))
            .build()
            .expect("valid config");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"1m 30s\""), "durations serialize as humantime: {json}");
        let parsed: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_store_config_deserialize_applies_defaults() {
        let parsed: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, StoreConfig::default());
    }

    // =========================================================================
    // AncientConfig
    // =========================================================================

    #[test]
    fn test_ancient_config_default_tables() {
        let config = AncientConfig::builder().build().expect("defaults should be valid");
        assert_eq!(config.tables, vec!["headers", "hashes", "bodies", "receipts", "difficulties"]);
    }

    #[test]
    fn test_ancient_config_rejects_bad_tables() {
        assert!(AncientConfig::builder().tables(vec![]).build().is_err());
        assert!(AncientConfig::builder().tables(vec!["a".into(), "a".into()]).build().is_err());
        assert!(AncientConfig::builder().tables(vec!["".into()]).build().is_err());
        let err = AncientConfig::builder().tables(vec!["bad:name".into()]).build().unwrap_err();
        assert!(err.to_string().contains("bad:name"));
    }

    // =========================================================================
    // TieredConfig
    // =========================================================================

    #[test]
    fn test_tiered_config_current_only() {
        let config = TieredConfig::builder().current_path("/data/current").build().unwrap();
        assert_eq!(config.current_path, PathBuf::from("/data/current"));
        assert!(config.archive_path.is_none());
        assert_eq!(config.archive_mode, ArchiveMode::Owned);
    }

    #[test]
    fn test_tiered_config_rejects_shared_paths() {
        let result = TieredConfig::builder()
            .current_path("/data/db")
            .archive_path("/data/db")
            .build();
        assert!(result.is_err());

        let result = TieredConfig::builder()
            .current_path("/data/current")
            .archive_path("/data/archive")
            .ancient_path("/data/archive")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_tiered_config_rejects_empty_current_path() {
        assert!(TieredConfig::builder().current_path("").build().is_err());
    }

    #[test]
    fn test_archive_mode_serde() {
        let json = r#"{"current_path":"/c","archive_path":"/a","archive_mode":"shared"}"#;
        let config: TieredConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.archive_mode, ArchiveMode::Shared);
        config.validate().unwrap();
    }

    // =========================================================================
    // ArchiverConfig
    // =========================================================================

    #[test]
    fn test_archiver_config_defaults() {
        let config = ArchiverConfig::builder().build().unwrap();
        assert_eq!(config.finality_delay, 32);
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert_eq!(config.chunk_size, 100);
    }

    #[test]
    fn test_archiver_config_rejects_zero_chunk() {
        let err = ArchiverConfig::builder().chunk_size(0).build().unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_archiver_config_finality_delay_zero_is_valid() {
        assert!(ArchiverConfig::builder().finality_delay(0).build().is_ok());
    }

    // =========================================================================
    // FreezerConfig
    // =========================================================================

    #[test]
    fn test_freezer_config_defaults() {
        let config = FreezerConfig::default();
        assert_eq!(config.freeze_threshold, 90_000);
        assert_eq!(config.batch_size, 2_000);
        assert!(!config.prune_source);
        config.validate().unwrap();
    }

    #[test]
    fn test_freezer_config_rejects_zero_batch() {
        assert!(FreezerConfig::builder().batch_size(0).build().is_err());
    }

    // =========================================================================
    // ReplayConfig
    // =========================================================================

    #[test]
    fn test_replay_config_defaults() {
        let config = ReplayConfig::builder().build().unwrap();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.commit_interval, 100);
        assert!(config.verify_blocks);
        assert!(!config.continue_on_error);
        assert_eq!(config.max_height, None);
    }

    #[test]
    fn test_replay_config_max_height() {
        let config = ReplayConfig::builder().max_height(42).build().unwrap();
        assert_eq!(config.max_height, Some(42));
    }

    #[test]
    fn test_replay_config_rejects_zero_sizes() {
        assert!(ReplayConfig::builder().batch_size(0).build().is_err());
        assert!(ReplayConfig::builder().commit_interval(0).build().is_err());
    }
}
