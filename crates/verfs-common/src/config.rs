//! Configuration types for VerFS
//!
//! The storage roots are explicit configuration handed to the engine at
//! construction time; nothing in the engine reads process-global paths.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for VerFS
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Check the configuration for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding both storage hierarchies
    pub data_dir: PathBuf,
    /// Name of the metadata hierarchy inside `data_dir`
    pub metadata_dir: String,
    /// Name of the version hierarchy inside `data_dir`
    pub versions_dir: String,
    /// Suffix appended to a virtual path to name its metadata record
    pub record_extension: String,
    /// Names starting with this prefix are bookkeeping and never listed
    pub hidden_prefix: String,
    /// Largest file a write may produce (default: 1 GB)
    pub max_file_size: u64,
    /// fsync blobs and records before reporting success
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            metadata_dir: ".metadata".to_string(),
            versions_dir: ".versions".to_string(),
            record_extension: ".json".to_string(),
            hidden_prefix: ".".to_string(),
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            sync_writes: true,
        }
    }
}

impl StorageConfig {
    /// Create config rooted at `data_dir` with default names
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Physical root of the metadata hierarchy
    #[must_use]
    pub fn metadata_root(&self) -> PathBuf {
        self.data_dir.join(&self.metadata_dir)
    }

    /// Physical root of the version hierarchy
    #[must_use]
    pub fn versions_root(&self) -> PathBuf {
        self.data_dir.join(&self.versions_dir)
    }

    /// Check the storage settings
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("metadata_dir", &self.metadata_dir),
            ("versions_dir", &self.versions_dir),
        ] {
            if value.is_empty() || value.contains('/') {
                return Err(Error::configuration(format!(
                    "{name} must be a single non-empty path component, got {value:?}"
                )));
            }
        }
        if self.metadata_dir == self.versions_dir {
            return Err(Error::configuration(
                "metadata_dir and versions_dir must differ",
            ));
        }
        if self.record_extension.is_empty() || self.record_extension.contains('/') {
            return Err(Error::configuration(format!(
                "record_extension must be a non-empty file suffix, got {:?}",
                self.record_extension
            )));
        }
        if self.hidden_prefix.is_empty() {
            return Err(Error::configuration("hidden_prefix must not be empty"));
        }
        if self.max_file_size == 0 {
            return Err(Error::configuration("max_file_size must be positive"));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.metadata_dir, ".metadata");
        assert_eq!(config.storage.versions_dir, ".versions");
        assert_eq!(config.storage.record_extension, ".json");
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_roots_follow_data_dir() {
        let storage = StorageConfig::with_data_dir("/srv/verfs");
        assert_eq!(storage.metadata_root(), PathBuf::from("/srv/verfs/.metadata"));
        assert_eq!(storage.versions_root(), PathBuf::from("/srv/verfs/.versions"));
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        let mut storage = StorageConfig::default();
        storage.versions_dir = storage.metadata_dir.clone();
        assert!(matches!(storage.validate(), Err(Error::Configuration(_))));

        let mut storage = StorageConfig::default();
        storage.metadata_dir = "a/b".to_string();
        assert!(storage.validate().is_err());

        let mut storage = StorageConfig::default();
        storage.record_extension = String::new();
        assert!(storage.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            data_dir = "/var/lib/verfs"
            max_file_size = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/verfs"));
        assert_eq!(config.storage.max_file_size, 4096);
        assert_eq!(config.storage.hidden_prefix, ".");
        assert_eq!(config.logging.level, "info");
    }
}
