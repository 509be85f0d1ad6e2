//! Physical storage layout
//!
//! Layout under the configured data directory:
//! ```text
//! <data_dir>/
//! ├── .metadata/                 metadata hierarchy
//! │   ├── notes.txt.json         record for /notes.txt
//! │   └── docs/                  virtual directory /docs
//! │       └── a.md.json          record for /docs/a.md
//! └── .versions/                 version hierarchy
//!     ├── notes.txt/
//!     │   ├── version_1          blob of /notes.txt, version 1
//!     │   └── version_2
//!     └── docs/
//!         └── a.md/
//!             └── version_1
//! ```

use std::path::{Path, PathBuf};
use verfs_common::{StorageConfig, VersionId, VirtualPath};

/// File name prefix of every version blob
pub const VERSION_FILE_PREFIX: &str = "version_";

/// Suffix of in-flight record files (always behind the hidden prefix)
const TEMP_SUFFIX: &str = ".tmp";

/// Maps virtual paths onto the two physical hierarchies
#[derive(Clone, Debug)]
pub struct StorageLayout {
    metadata_root: PathBuf,
    versions_root: PathBuf,
    record_extension: String,
    hidden_prefix: String,
}

impl StorageLayout {
    /// Build the layout described by a storage configuration
    #[must_use]
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            metadata_root: config.metadata_root(),
            versions_root: config.versions_root(),
            record_extension: config.record_extension.clone(),
            hidden_prefix: config.hidden_prefix.clone(),
        }
    }

    /// Root of the metadata hierarchy
    #[must_use]
    pub fn metadata_root(&self) -> &Path {
        &self.metadata_root
    }

    /// Root of the version hierarchy
    #[must_use]
    pub fn versions_root(&self) -> &Path {
        &self.versions_root
    }

    /// Suffix naming metadata records
    #[must_use]
    pub fn record_extension(&self) -> &str {
        &self.record_extension
    }

    /// Prefix reserved for bookkeeping entries
    #[must_use]
    pub fn hidden_prefix(&self) -> &str {
        &self.hidden_prefix
    }

    /// Location of the metadata record for a virtual file
    #[must_use]
    pub fn record_path(&self, path: &VirtualPath) -> PathBuf {
        debug_assert!(!path.is_root(), "the root has no metadata record");
        self.metadata_root
            .join(format!("{}{}", path.relative(), self.record_extension))
    }

    /// Scratch file a record is written to before being renamed into place
    #[must_use]
    pub fn record_temp_path(&self, path: &VirtualPath) -> PathBuf {
        let record = self.record_path(path);
        let name = record
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        record.with_file_name(format!("{}{name}{TEMP_SUFFIX}", self.hidden_prefix))
    }

    /// Physical directory backing a virtual directory on the metadata side
    #[must_use]
    pub fn metadata_dir(&self, path: &VirtualPath) -> PathBuf {
        if path.is_root() {
            self.metadata_root.clone()
        } else {
            self.metadata_root.join(path.relative())
        }
    }

    /// Physical directory on the version side; for a file it holds its blobs
    #[must_use]
    pub fn version_dir(&self, path: &VirtualPath) -> PathBuf {
        if path.is_root() {
            self.versions_root.clone()
        } else {
            self.versions_root.join(path.relative())
        }
    }

    /// Location of one version blob
    #[must_use]
    pub fn blob_path(&self, path: &VirtualPath, version_id: VersionId) -> PathBuf {
        self.version_dir(path)
            .join(format!("{VERSION_FILE_PREFIX}{version_id}"))
    }

    /// True if a physical entry name is bookkeeping
    #[must_use]
    pub fn is_hidden(&self, name: &str) -> bool {
        name.starts_with(&self.hidden_prefix)
    }

    /// Recover a virtual file name from a record file name
    #[must_use]
    pub fn strip_record_extension<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_suffix(&self.record_extension)
            .filter(|stem| !stem.is_empty())
    }
}
