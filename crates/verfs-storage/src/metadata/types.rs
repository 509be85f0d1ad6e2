//! In-memory metadata model

use std::path::{Path, PathBuf};
use verfs_common::{FileAttributes, VersionId, VirtualPath};

/// One immutable snapshot of a file's content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    /// Position-derived id, starting at 1
    pub version_id: VersionId,
    /// Creation time (seconds since the UNIX epoch)
    pub timestamp: i64,
    /// Storage location of the version blob
    pub blob_ref: PathBuf,
}

/// Attributes and version history of one virtual file
///
/// The version list can only grow through [`FileMetadata::push_version`],
/// which keeps ids gap-free and `attributes.size` equal to the latest
/// blob length. The version count is the list length; it is never stored
/// separately in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    path: VirtualPath,
    attributes: FileAttributes,
    versions: Vec<VersionInfo>,
}

impl FileMetadata {
    /// A new regular file with no versions
    #[must_use]
    pub const fn new(path: VirtualPath, permissions: u32, mtime: i64) -> Self {
        Self {
            path,
            attributes: FileAttributes::regular(permissions, mtime),
            versions: Vec::new(),
        }
    }

    /// Assemble a record that has already passed validation
    pub(crate) const fn from_parts(
        path: VirtualPath,
        attributes: FileAttributes,
        versions: Vec<VersionInfo>,
    ) -> Self {
        Self {
            path,
            attributes,
            versions,
        }
    }

    /// Virtual path this record describes
    #[must_use]
    pub const fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Current attributes
    #[must_use]
    pub const fn attributes(&self) -> &FileAttributes {
        &self.attributes
    }

    /// Version history, oldest first
    #[must_use]
    pub fn versions(&self) -> &[VersionInfo] {
        &self.versions
    }

    /// Number of versions
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Most recent version, if any
    #[must_use]
    pub fn latest(&self) -> Option<&VersionInfo> {
        self.versions.last()
    }

    /// Look up a version by id
    #[must_use]
    pub fn version(&self, id: VersionId) -> Option<&VersionInfo> {
        id.index().and_then(|i| self.versions.get(i))
    }

    /// Id the next appended version will get
    #[must_use]
    pub fn next_version_id(&self) -> VersionId {
        VersionId::from_index(self.versions.len())
    }

    /// Append a version whose blob has already been persisted
    pub fn push_version(&mut self, blob_ref: &Path, size: u64, timestamp: i64) -> VersionId {
        let version_id = self.next_version_id();
        self.versions.push(VersionInfo {
            version_id,
            timestamp,
            blob_ref: blob_ref.to_path_buf(),
        });
        self.attributes.size = size;
        self.attributes.mtime = timestamp;
        version_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verfs_common::S_IFREG;

    #[test]
    fn test_new_metadata_is_empty() {
        let meta = FileMetadata::new(VirtualPath::new("/f").unwrap(), 0o600, 42);
        assert_eq!(meta.version_count(), 0);
        assert!(meta.latest().is_none());
        assert_eq!(meta.attributes().mode, S_IFREG | 0o600);
        assert_eq!(meta.attributes().size, 0);
        assert_eq!(meta.attributes().mtime, 42);
        assert_eq!(meta.next_version_id(), VersionId::FIRST);
    }

    #[test]
    fn test_push_version_keeps_ids_dense() {
        let mut meta = FileMetadata::new(VirtualPath::new("/f").unwrap(), 0o644, 0);
        for (i, size) in [4u64, 2, 9].into_iter().enumerate() {
            let blob = PathBuf::from(format!("/v/version_{}", i + 1));
            let id = meta.push_version(&blob, size, 100 + i as i64);
            assert_eq!(id, VersionId::from_index(i));
        }

        assert_eq!(meta.version_count(), 3);
        for (i, v) in meta.versions().iter().enumerate() {
            assert_eq!(v.version_id.get(), i as u64 + 1);
        }
        assert_eq!(meta.attributes().size, 9);
        assert_eq!(meta.attributes().mtime, 102);
        assert_eq!(meta.version(VersionId::new(2)).unwrap().timestamp, 101);
        assert!(meta.version(VersionId::new(4)).is_none());
        assert!(meta.version(VersionId::new(0)).is_none());
    }
}
