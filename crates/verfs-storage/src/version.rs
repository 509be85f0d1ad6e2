//! Version blob storage
//!
//! Each version of a file is a raw byte blob at
//! `<versions-root>/<virtual path>/version_<id>`: no header, no checksum.
//! Blobs are created once and never rewritten; the operation layer hands
//! out ids monotonically so a save never targets an existing blob.

use crate::layout::StorageLayout;
use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use verfs_common::{Error, Result, VersionId, VirtualPath};

/// Reads and writes immutable version blobs
#[derive(Clone, Debug)]
pub struct VersionStore {
    layout: Arc<StorageLayout>,
    sync_writes: bool,
}

impl VersionStore {
    /// Create a store over the given layout
    #[must_use]
    pub const fn new(layout: Arc<StorageLayout>, sync_writes: bool) -> Self {
        Self {
            layout,
            sync_writes,
        }
    }

    /// Storage reference recorded for a version
    #[must_use]
    pub fn blob_path(&self, path: &VirtualPath, version_id: VersionId) -> PathBuf {
        self.layout.blob_path(path, version_id)
    }

    /// Write a new blob and return its location
    ///
    /// The containing directory is created if absent. An existing blob at
    /// the same address is an error, and a failed write leaves no partial
    /// blob behind.
    pub fn save(&self, path: &VirtualPath, version_id: VersionId, data: &[u8]) -> Result<PathBuf> {
        let dir = self.layout.version_dir(path);
        fs::create_dir_all(&dir).map_err(|e| Error::from_io(e, &dir))?;

        let blob_path = self.layout.blob_path(path, version_id);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&blob_path)
            .map_err(|e| Error::from_io(e, &blob_path))?;

        if let Err(e) = self.write_blob(&mut file, data) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&blob_path) {
                warn!("Failed to remove partial blob {:?}: {}", blob_path, cleanup);
            }
            return Err(Error::Io(e));
        }

        debug!(
            "Saved version {} of {} ({} bytes)",
            version_id,
            path,
            data.len()
        );
        Ok(blob_path)
    }

    fn write_blob(&self, file: &mut File, data: &[u8]) -> io::Result<()> {
        // write_all reports a short write as WriteZero
        file.write_all(data)?;
        if self.sync_writes {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Read a whole blob back
    ///
    /// The byte count read must match the size the filesystem reported
    /// when the blob was opened.
    pub fn load(&self, path: &VirtualPath, version_id: VersionId) -> Result<Bytes> {
        let blob_path = self.layout.blob_path(path, version_id);
        self.load_blob(&blob_path).map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("{path} version {version_id}")),
            other => other,
        })
    }

    /// Read a blob from an explicit storage reference
    pub fn load_blob(&self, blob_path: &Path) -> Result<Bytes> {
        let mut file = File::open(blob_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(blob_path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let expected = file.metadata()?.len();
        let capacity = usize::try_from(expected).map_err(|_| Error::OutOfMemory { size: expected })?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|e| Error::out_of_memory(expected, e))?;
        file.read_to_end(&mut buf)?;

        if buf.len() as u64 != expected {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read {} bytes from {}, expected {}",
                    buf.len(),
                    blob_path.display(),
                    expected
                ),
            )));
        }
        Ok(Bytes::from(buf))
    }

    /// Delete a single blob that no record references
    pub fn discard(&self, path: &VirtualPath, version_id: VersionId) -> Result<()> {
        let blob_path = self.layout.blob_path(path, version_id);
        fs::remove_file(&blob_path).map_err(|e| Error::from_io(e, &blob_path))?;
        debug!("Discarded version {} of {}", version_id, path);
        Ok(())
    }

    /// Delete every blob of a file
    ///
    /// A file that never had a version has no directory; that is not an
    /// error.
    pub fn remove_all(&self, path: &VirtualPath) -> Result<()> {
        let dir = self.layout.version_dir(path);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Removed versions of {}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
