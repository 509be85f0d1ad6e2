//! Directory mirroring
//!
//! Every virtual directory exists twice on disk: once under the metadata
//! root (where it holds records and subdirectories) and once under the
//! versions root (where it holds the per-file blob directories). The
//! metadata side is authoritative for listing and stat.

use crate::layout::StorageLayout;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use verfs_common::{
    DirEntry, Error, FileAttributes, FileKind, ROOT_PERMISSIONS, Result, VirtualPath,
};

/// Owner bits always kept on physical directories so the engine can
/// manage their contents regardless of the mode a client asked for
const OWNER_RWX: u32 = 0o700;

/// Keeps the metadata and version hierarchies shaped like the virtual tree
#[derive(Clone, Debug)]
pub struct DirectoryMirror {
    layout: Arc<StorageLayout>,
}

impl DirectoryMirror {
    /// Create a mirror over the given layout
    #[must_use]
    pub const fn new(layout: Arc<StorageLayout>) -> Self {
        Self { layout }
    }

    /// Create both storage roots if they do not exist yet
    pub fn bootstrap(&self) -> Result<()> {
        for root in [self.layout.metadata_root(), self.layout.versions_root()] {
            fs::create_dir_all(root).map_err(|e| Error::from_io(e, root))?;
        }
        info!(
            "Storage roots ready: metadata={:?} versions={:?}",
            self.layout.metadata_root(),
            self.layout.versions_root()
        );
        Ok(())
    }

    /// True if `path` is a virtual directory
    #[must_use]
    pub fn is_dir(&self, path: &VirtualPath) -> bool {
        self.layout.metadata_dir(path).is_dir()
    }

    /// Create the directory pair for `path`
    ///
    /// The parent virtual directory must exist. If the version side cannot
    /// be created the metadata side is rolled back.
    pub fn mkdir(&self, path: &VirtualPath, permissions: u32) -> Result<()> {
        let meta_dir = self.layout.metadata_dir(path);
        create_dir(&meta_dir, permissions | OWNER_RWX)
            .map_err(|e| Error::from_io(e, Path::new(path.as_str())))?;

        let version_dir = self.layout.version_dir(path);
        if let Err(e) = fs::create_dir_all(&version_dir) {
            if let Err(rollback) = fs::remove_dir(&meta_dir) {
                warn!(
                    "Failed to roll back {:?} after version-side mkdir error: {}",
                    meta_dir, rollback
                );
            }
            return Err(Error::from_io(e, &version_dir));
        }

        debug!("Created directory {}", path);
        Ok(())
    }

    /// Remove the directory pair for `path`
    ///
    /// The metadata side must be empty and is removed first. Once it is gone
    /// the directory no longer exists for clients; a failure on the version
    /// side is then a leak, logged and returned to the caller.
    pub fn rmdir(&self, path: &VirtualPath) -> Result<()> {
        let meta_dir = self.layout.metadata_dir(path);
        if !meta_dir.is_dir() {
            return Err(if meta_dir.exists() {
                Error::NotDirectory(path.to_string())
            } else {
                Error::NotFound(path.to_string())
            });
        }
        self.clear_hidden_files(&meta_dir)?;
        fs::remove_dir(&meta_dir).map_err(|e| Error::from_io(e, Path::new(path.as_str())))?;

        let version_dir = self.layout.version_dir(path);
        match fs::remove_dir_all(&version_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    "Directory {} removed but version side {:?} leaked: {}",
                    path, version_dir, e
                );
                return Err(Error::Io(e));
            }
        }

        debug!("Removed directory {}", path);
        Ok(())
    }

    /// Delete scratch files a crash left in a metadata-side directory
    ///
    /// They are invisible to `list` and must not keep an otherwise empty
    /// directory alive.
    fn clear_hidden_files(&self, meta_dir: &Path) -> Result<()> {
        for entry in fs::read_dir(meta_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let hidden = name.to_str().is_some_and(|n| self.layout.is_hidden(n));
            if hidden && entry.file_type()?.is_file() {
                debug!("Removing stale scratch file {:?}", entry.path());
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Enumerate a virtual directory
    ///
    /// Record files become file entries with the record extension stripped,
    /// physical subdirectories become directory entries, and hidden entries
    /// are skipped. Entries are sorted by name.
    pub fn list(&self, path: &VirtualPath) -> Result<Vec<DirEntry>> {
        let meta_dir = self.layout.metadata_dir(path);
        let read_dir =
            fs::read_dir(&meta_dir).map_err(|e| Error::from_io(e, Path::new(path.as_str())))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                debug!("Skipping non UTF-8 entry {:?} in {}", entry.file_name(), path);
                continue;
            };
            if self.layout.is_hidden(&name) {
                continue;
            }

            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                entries.push(DirEntry {
                    name,
                    kind: FileKind::Directory,
                });
            } else if file_type.is_file() {
                if let Some(stem) = self.layout.strip_record_extension(&name) {
                    entries.push(DirEntry {
                        name: stem.to_string(),
                        kind: FileKind::File,
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Attributes of a virtual directory, taken from its metadata side
    ///
    /// The root always reports the fixed root permissions.
    pub fn dir_attributes(&self, path: &VirtualPath) -> Result<FileAttributes> {
        let meta_dir = self.layout.metadata_dir(path);
        let meta = fs::metadata(&meta_dir).map_err(|e| Error::from_io(e, Path::new(path.as_str())))?;
        if !meta.is_dir() {
            return Err(Error::NotDirectory(path.to_string()));
        }

        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        let permissions = if path.is_root() {
            ROOT_PERMISSIONS
        } else {
            physical_permissions(&meta)
        };
        Ok(FileAttributes::directory(permissions, mtime))
    }
}

#[cfg(unix)]
fn create_dir(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().mode(mode).create(path)
}

#[cfg(not(unix))]
fn create_dir(path: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir(path)
}

#[cfg(unix)]
fn physical_permissions(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & verfs_common::PERMISSION_MASK
}

#[cfg(not(unix))]
fn physical_permissions(_meta: &fs::Metadata) -> u32 {
    ROOT_PERMISSIONS
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use verfs_common::{S_IFDIR, StorageConfig};

    fn test_mirror(dir: &Path) -> (DirectoryMirror, Arc<StorageLayout>) {
        let layout = Arc::new(StorageLayout::new(&StorageConfig::with_data_dir(dir)));
        let mirror = DirectoryMirror::new(layout.clone());
        mirror.bootstrap().unwrap();
        (mirror, layout)
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let dir = tempdir().unwrap();
        let (mirror, layout) = test_mirror(dir.path());
        mirror.bootstrap().unwrap();
        assert!(layout.metadata_root().is_dir());
        assert!(layout.versions_root().is_dir());
    }

    #[test]
    fn test_mkdir_creates_both_sides() {
        let dir = tempdir().unwrap();
        let (mirror, layout) = test_mirror(dir.path());
        let d = VirtualPath::new("/d").unwrap();

        mirror.mkdir(&d, 0o755).unwrap();
        assert!(layout.metadata_dir(&d).is_dir());
        assert!(layout.version_dir(&d).is_dir());
        assert!(mirror.is_dir(&d));

        let err = mirror.mkdir(&d, 0o755).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_mkdir_requires_parent() {
        let dir = tempdir().unwrap();
        let (mirror, _) = test_mirror(dir.path());
        let err = mirror
            .mkdir(&VirtualPath::new("/missing/child").unwrap(), 0o755)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_strips_extension_and_hides_bookkeeping() {
        let dir = tempdir().unwrap();
        let (mirror, layout) = test_mirror(dir.path());
        let root = layout.metadata_root();
        fs::write(root.join("b.txt.json"), b"{}").unwrap();
        fs::write(root.join("a.json"), b"{}").unwrap();
        fs::write(root.join(".a.json.tmp"), b"{}").unwrap();
        fs::write(root.join("stray.bin"), b"").unwrap();
        mirror.mkdir(&VirtualPath::new("/sub").unwrap(), 0o755).unwrap();
        fs::create_dir(root.join(".hidden")).unwrap();

        let entries = mirror.list(&VirtualPath::root()).unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "a".into(),
                    kind: FileKind::File
                },
                DirEntry {
                    name: "b.txt".into(),
                    kind: FileKind::File
                },
                DirEntry {
                    name: "sub".into(),
                    kind: FileKind::Directory
                },
            ]
        );
    }

    #[test]
    fn test_list_missing_directory() {
        let dir = tempdir().unwrap();
        let (mirror, _) = test_mirror(dir.path());
        let err = mirror.list(&VirtualPath::new("/nope").unwrap()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rmdir() {
        let dir = tempdir().unwrap();
        let (mirror, layout) = test_mirror(dir.path());
        let d = VirtualPath::new("/d").unwrap();
        mirror.mkdir(&d, 0o755).unwrap();
        fs::write(layout.metadata_dir(&d).join("f.json"), b"{}").unwrap();

        let err = mirror.rmdir(&d).unwrap_err();
        assert!(matches!(err, Error::NotEmpty(_)));

        fs::remove_file(layout.metadata_dir(&d).join("f.json")).unwrap();
        // Leftover blobs on the version side do not block removal
        fs::create_dir_all(layout.version_dir(&d).join("f")).unwrap();
        fs::write(layout.version_dir(&d).join("f/version_1"), b"x").unwrap();

        mirror.rmdir(&d).unwrap();
        assert!(!layout.metadata_dir(&d).exists());
        assert!(!layout.version_dir(&d).exists());
        assert!(mirror.rmdir(&d).unwrap_err().is_not_found());
    }

    #[test]
    fn test_rmdir_ignores_stale_scratch_files() {
        let dir = tempdir().unwrap();
        let (mirror, layout) = test_mirror(dir.path());
        let d = VirtualPath::new("/d").unwrap();
        mirror.mkdir(&d, 0o755).unwrap();
        fs::write(layout.metadata_dir(&d).join(".f.json.tmp"), b"{").unwrap();
        assert!(mirror.list(&d).unwrap().is_empty());

        mirror.rmdir(&d).unwrap();
        assert!(!layout.metadata_dir(&d).exists());
    }

    #[test]
    fn test_rmdir_keeps_visible_entries() {
        let dir = tempdir().unwrap();
        let (mirror, layout) = test_mirror(dir.path());
        let d = VirtualPath::new("/d").unwrap();
        mirror.mkdir(&d, 0o755).unwrap();
        fs::write(layout.metadata_dir(&d).join("f.json"), b"{}").unwrap();
        fs::write(layout.metadata_dir(&d).join(".f.json.tmp"), b"{").unwrap();

        assert!(matches!(mirror.rmdir(&d).unwrap_err(), Error::NotEmpty(_)));
        assert!(layout.metadata_dir(&d).join("f.json").is_file());
    }

    #[test]
    fn test_mkdir_rolls_back_when_version_side_fails() {
        let dir = tempdir().unwrap();
        let (mirror, layout) = test_mirror(dir.path());
        let d = VirtualPath::new("/d").unwrap();
        // A regular file where the version-side directory must go
        fs::write(layout.version_dir(&d), b"in the way").unwrap();

        let err = mirror.mkdir(&d, 0o755).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(!layout.metadata_dir(&d).exists());
        assert!(!mirror.is_dir(&d));
        assert!(layout.version_dir(&d).is_file());
    }

    #[test]
    fn test_rmdir_reports_version_side_leak() {
        let dir = tempdir().unwrap();
        let (mirror, layout) = test_mirror(dir.path());
        let d = VirtualPath::new("/d").unwrap();
        mirror.mkdir(&d, 0o755).unwrap();
        // Swap the version-side directory for a regular file
        fs::remove_dir(layout.version_dir(&d)).unwrap();
        fs::write(layout.version_dir(&d), b"leak").unwrap();

        let err = mirror.rmdir(&d).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        // The directory is gone for clients; the leak stays on disk
        assert!(!layout.metadata_dir(&d).exists());
        assert!(!mirror.is_dir(&d));
        assert!(layout.version_dir(&d).is_file());
    }

    #[test]
    fn test_dir_attributes() {
        let dir = tempdir().unwrap();
        let (mirror, _) = test_mirror(dir.path());

        let root = mirror.dir_attributes(&VirtualPath::root()).unwrap();
        assert_eq!(root.mode, S_IFDIR | ROOT_PERMISSIONS);
        assert_eq!(root.nlink, 2);

        let d = VirtualPath::new("/d").unwrap();
        mirror.mkdir(&d, 0o750).unwrap();
        let attrs = mirror.dir_attributes(&d).unwrap();
        assert_eq!(attrs.kind(), FileKind::Directory);
        assert_eq!(attrs.size, 0);
    }
}
