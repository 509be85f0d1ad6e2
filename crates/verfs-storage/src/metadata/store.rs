//! Metadata record persistence

use super::record::MetadataRecord;
use super::types::FileMetadata;
use crate::layout::StorageLayout;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use verfs_common::{Error, Result, VirtualPath};

/// Reads and writes one JSON record per virtual file
///
/// The store performs no locking; the operation layer serializes access
/// to each path.
#[derive(Clone, Debug)]
pub struct MetadataStore {
    layout: Arc<StorageLayout>,
    sync_writes: bool,
}

impl MetadataStore {
    /// Create a store over the given layout
    #[must_use]
    pub const fn new(layout: Arc<StorageLayout>, sync_writes: bool) -> Self {
        Self {
            layout,
            sync_writes,
        }
    }

    /// Persist the full record, replacing any previous one
    ///
    /// Missing parent directories on the metadata side are created.
    pub fn save(&self, metadata: &FileMetadata) -> Result<()> {
        let record_path = self.layout.record_path(metadata.path());
        if let Some(parent) = record_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(e, parent))?;
        }

        let record = MetadataRecord::from_metadata(metadata);
        let json = serde_json::to_vec_pretty(&record).map_err(|e| {
            Error::serialization(format!("failed to encode record for {}: {e}", metadata.path()))
        })?;

        let temp_path = self.layout.record_temp_path(metadata.path());
        let written = self
            .write_file(&temp_path, &json)
            .and_then(|()| fs::rename(&temp_path, &record_path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove scratch record {:?}: {}", temp_path, cleanup);
                }
            }
            return Err(Error::Io(e));
        }

        debug!(
            "Saved metadata for {} ({} versions)",
            metadata.path(),
            metadata.version_count()
        );
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(contents)?;
        if self.sync_writes {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Load and validate the record for `path`
    ///
    /// Returns [`Error::NotFound`] when no record exists and
    /// [`Error::Corrupt`] when one exists but fails validation.
    pub fn load(&self, path: &VirtualPath) -> Result<FileMetadata> {
        let record_path = self.layout.record_path(path);
        // A directory at the record location is a virtual directory, not a record
        let bytes = fs::read(&record_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::IsADirectory => {
                Error::NotFound(path.to_string())
            }
            _ => Error::Io(e),
        })?;

        let record: MetadataRecord = serde_json::from_slice(&bytes)
            .map_err(|e| Error::corrupt(path.as_str(), e.to_string()))?;
        record.into_metadata(path, &self.layout)
    }

    /// True if a record file exists for `path`
    #[must_use]
    pub fn exists(&self, path: &VirtualPath) -> bool {
        !path.is_root() && self.layout.record_path(path).is_file()
    }

    /// Delete the record for `path`
    pub fn remove(&self, path: &VirtualPath) -> Result<()> {
        let record_path = self.layout.record_path(path);
        fs::remove_file(&record_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
            _ => Error::Io(e),
        })?;
        debug!("Removed metadata for {}", path);
        Ok(())
    }
}
