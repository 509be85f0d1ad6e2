//! Versioned filesystem operations
//!
//! [`VersionedFs`] is the only component that enforces the data model: it
//! sequences metadata and blob accesses so that every write appends exactly
//! one version and a record never points at a blob that was not persisted.
//!
//! Lock discipline: reads take the shared lock of their path. Mutations take
//! the shared lock of the parent directory, then the exclusive lock of the
//! path itself, so `rmdir` (exclusive on the directory) cannot interleave
//! with an operation creating or removing one of its children.

use crate::lock::{PathGuard, PathLockTable};
use crate::patch;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};
use verfs_common::{
    AccessMode, DEFAULT_FILE_PERMISSIONS, DirEntry, Error, FileAttributes, PERMISSION_MASK,
    Result, StorageConfig, VersionId, VirtualPath, VirtualPathError, unix_now,
};
use verfs_storage::{
    DirectoryMirror, FileMetadata, MetadataStore, StorageLayout, VersionInfo, VersionStore,
};

/// Locks held for the duration of a mutation
struct UpdateGuard<'a> {
    _parent: Option<PathGuard<'a>>,
    _path: PathGuard<'a>,
}

/// Versioned storage engine
///
/// Every call loads a fresh copy of the metadata it needs and discards it
/// when done; nothing is cached between calls. The engine is `Send + Sync`
/// and is meant to be shared behind an `Arc`.
#[derive(Debug)]
pub struct VersionedFs {
    config: StorageConfig,
    metadata: MetadataStore,
    versions: VersionStore,
    mirror: DirectoryMirror,
    locks: PathLockTable,
}

impl VersionedFs {
    /// Open the storage rooted at `config.data_dir`
    ///
    /// Both roots are created if they do not exist.
    pub fn new(config: StorageConfig) -> Result<Self> {
        config.validate()?;

        let layout = Arc::new(StorageLayout::new(&config));
        let fs = Self {
            metadata: MetadataStore::new(layout.clone(), config.sync_writes),
            versions: VersionStore::new(layout.clone(), config.sync_writes),
            mirror: DirectoryMirror::new(layout),
            locks: PathLockTable::new(),
            config,
        };
        fs.mirror.bootstrap()?;

        info!("Opened versioned storage at {:?}", fs.config.data_dir);
        Ok(fs)
    }

    /// Storage configuration in effect
    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Attributes of a file or directory
    pub fn stat(&self, raw: &str) -> Result<FileAttributes> {
        let path = self.resolve(raw)?;
        let _guard = self.locks.read(&path);

        let attributes = if path.is_root() {
            self.mirror.dir_attributes(&path)?
        } else {
            match self.metadata.load(&path) {
                Ok(_) if names_directory(raw) => {
                    return Err(Error::NotDirectory(path.to_string()));
                }
                Ok(meta) => *meta.attributes(),
                Err(e) if e.is_not_found() && self.mirror.is_dir(&path) => {
                    self.mirror.dir_attributes(&path)?
                }
                Err(e) => return Err(e),
            }
        };

        debug!(
            "stat {}: mode={:o} size={}",
            path, attributes.mode, attributes.size
        );
        Ok(attributes)
    }

    /// Entries of a directory, sorted by name
    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = self.resolve(path)?;
        let _guard = self.locks.read(&path);

        if self.metadata.exists(&path) {
            return Err(Error::NotDirectory(path.to_string()));
        }
        let entries = self.mirror.list(&path)?;

        debug!("list {}: {} entries", path, entries.len());
        Ok(entries)
    }

    /// Check that `path` may be opened with `mode`
    ///
    /// Write access needs the owner write bit. Directories may only be
    /// opened for reading.
    pub fn open(&self, raw: &str, mode: AccessMode) -> Result<()> {
        let path = self.resolve(raw)?;
        let _guard = self.locks.read(&path);

        match self.load_file(&path) {
            Ok(_) if names_directory(raw) => {
                return Err(Error::NotDirectory(path.to_string()));
            }
            Ok(meta) => {
                if mode.wants_write() && !meta.attributes().is_writable() {
                    return Err(Error::PermissionDenied(path.to_string()));
                }
            }
            Err(Error::IsDirectory(_)) if !mode.wants_write() => {}
            Err(e) => return Err(e),
        }

        debug!("open {} ({:?})", path, mode);
        Ok(())
    }

    /// Read up to `len` bytes of the latest version starting at `offset`
    ///
    /// A file without versions, or an offset at or past the end, yields no
    /// bytes.
    pub fn read(&self, path: &str, offset: u64, len: usize) -> Result<Bytes> {
        let path = self.resolve_file(path)?;
        let _guard = self.locks.read(&path);

        let meta = self.load_file(&path)?;
        let Some(latest) = meta.latest() else {
            debug!("read {}: no versions", path);
            return Ok(Bytes::new());
        };
        let content = self.versions.load(&path, latest.version_id)?;
        let data = clip(&content, offset, len);

        debug!(
            "read {}: {} bytes at {} from version {}",
            path,
            data.len(),
            offset,
            latest.version_id
        );
        Ok(data)
    }

    /// Create an empty regular file
    pub fn create(&self, path: &str, permissions: u32) -> Result<FileAttributes> {
        let path = self.resolve_file(path)?;
        if path.is_root() {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        let _guard = self.lock_update(&path);

        if self.metadata.exists(&path) || self.mirror.is_dir(&path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        let meta = self.fresh_metadata(&path, permissions)?;
        self.metadata.save(&meta)?;

        debug!("create {} ({:o})", path, meta.attributes().mode);
        Ok(*meta.attributes())
    }

    /// Write `data` at `offset`, producing a new version
    ///
    /// The new version is the latest content with `data` laid over it; the
    /// file grows when the write ends past it and any gap is zero-filled. A
    /// missing file is created with default permissions. Returns the number
    /// of bytes written.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let path = self.resolve_file(path)?;
        let _guard = self.lock_update(&path);

        let mut meta = match self.load_file(&path) {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => self.fresh_metadata(&path, DEFAULT_FILE_PERMISSIONS)?,
            Err(e) => return Err(e),
        };
        let old = self.latest_content(&meta)?;
        let content = patch::patch(&old, offset, data, self.config.max_file_size)?;
        let version_id = self.commit(&mut meta, &content)?;

        debug!(
            "write {}: {} bytes at {} -> version {} ({} bytes)",
            path,
            data.len(),
            offset,
            version_id,
            content.len()
        );
        Ok(data.len())
    }

    /// Set the file length, producing a new version
    ///
    /// The content is cut or zero-extended to `size`. Truncating to the
    /// current length creates no version.
    pub fn truncate(&self, path: &str, size: u64) -> Result<()> {
        let path = self.resolve_file(path)?;
        let _guard = self.lock_update(&path);

        let mut meta = self.load_file(&path)?;
        if meta.attributes().size == size {
            debug!("truncate {}: already {} bytes", path, size);
            return Ok(());
        }
        let old = self.latest_content(&meta)?;
        let content = patch::resize(&old, size, self.config.max_file_size)?;
        let version_id = self.commit(&mut meta, &content)?;

        debug!("truncate {}: {} bytes -> version {}", path, size, version_id);
        Ok(())
    }

    /// Remove a file and all of its versions
    ///
    /// The record goes first; once it is gone the file no longer exists. A
    /// failure to remove the blobs afterwards is reported but not undone.
    pub fn unlink(&self, path: &str) -> Result<()> {
        let path = self.resolve_file(path)?;
        if path.is_root() {
            return Err(Error::IsDirectory(path.to_string()));
        }
        let _guard = self.lock_update(&path);

        if !self.metadata.exists(&path) && self.mirror.is_dir(&path) {
            return Err(Error::IsDirectory(path.to_string()));
        }
        self.metadata.remove(&path)?;
        if let Err(e) = self.versions.remove_all(&path) {
            warn!("Unlinked {} but its versions leaked: {}", path, e);
            return Err(e);
        }

        debug!("unlink {}", path);
        Ok(())
    }

    /// Create a directory
    pub fn mkdir(&self, path: &str, permissions: u32) -> Result<()> {
        let path = self.resolve(path)?;
        if path.is_root() {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        let _guard = self.lock_update(&path);

        if self.metadata.exists(&path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        self.require_parent_dir(&path)?;
        self.check_dir_name(&path)?;
        self.mirror.mkdir(&path, permissions & PERMISSION_MASK)?;

        debug!("mkdir {} ({:o})", path, permissions);
        Ok(())
    }

    /// Remove an empty directory
    pub fn rmdir(&self, path: &str) -> Result<()> {
        let path = self.resolve(path)?;
        if path.is_root() {
            return Err(Error::PermissionDenied(
                "the root directory cannot be removed".to_string(),
            ));
        }
        let _guard = self.lock_update(&path);

        if self.metadata.exists(&path) {
            return Err(Error::NotDirectory(path.to_string()));
        }
        self.mirror.rmdir(&path)?;

        debug!("rmdir {}", path);
        Ok(())
    }

    /// Version history of a file, oldest first
    pub fn versions(&self, path: &str) -> Result<Vec<VersionInfo>> {
        let path = self.resolve_file(path)?;
        let _guard = self.locks.read(&path);

        let meta = self.load_file(&path)?;
        Ok(meta.versions().to_vec())
    }

    /// Read from a specific version instead of the latest one
    pub fn read_version(
        &self,
        path: &str,
        version_id: VersionId,
        offset: u64,
        len: usize,
    ) -> Result<Bytes> {
        let path = self.resolve_file(path)?;
        let _guard = self.locks.read(&path);

        let meta = self.load_file(&path)?;
        if meta.version(version_id).is_none() {
            return Err(Error::NotFound(format!("{path} version {version_id}")));
        }
        let content = self.versions.load(&path, version_id)?;
        let data = clip(&content, offset, len);

        debug!(
            "read {}: {} bytes at {} from version {}",
            path,
            data.len(),
            offset,
            version_id
        );
        Ok(data)
    }

    /// Parse a client path, rejecting names the storage keeps for itself
    fn resolve(&self, path: &str) -> Result<VirtualPath> {
        let path = VirtualPath::new(path)?;
        if path.has_component_prefixed(&self.config.hidden_prefix) {
            return Err(VirtualPathError::ReservedPrefix(path.to_string()).into());
        }
        Ok(path)
    }

    /// Parse a client path that must name a regular file
    ///
    /// A trailing slash only matches a directory.
    fn resolve_file(&self, raw: &str) -> Result<VirtualPath> {
        let path = self.resolve(raw)?;
        if !names_directory(raw) {
            return Ok(path);
        }
        Err(if self.mirror.is_dir(&path) {
            Error::IsDirectory(path.to_string())
        } else if self.metadata.exists(&path) {
            Error::NotDirectory(path.to_string())
        } else {
            Error::NotFound(path.to_string())
        })
    }

    /// Directory names must not end in the record extension, where they
    /// would occupy the record file of a sibling
    fn check_dir_name(&self, path: &VirtualPath) -> Result<()> {
        let extension = &self.config.record_extension;
        if path.file_name().is_some_and(|name| name.ends_with(extension.as_str())) {
            return Err(VirtualPathError::ReservedSuffix(path.to_string()).into());
        }
        Ok(())
    }

    fn lock_update(&self, path: &VirtualPath) -> UpdateGuard<'_> {
        let parent = path.parent().map(|parent| self.locks.read(&parent));
        UpdateGuard {
            _parent: parent,
            _path: self.locks.write(path),
        }
    }

    /// Load the record of a regular file, reporting directories as such
    fn load_file(&self, path: &VirtualPath) -> Result<FileMetadata> {
        if path.is_root() {
            return Err(Error::IsDirectory(path.to_string()));
        }
        match self.metadata.load(path) {
            Err(e) if e.is_not_found() && self.mirror.is_dir(path) => {
                Err(Error::IsDirectory(path.to_string()))
            }
            other => other,
        }
    }

    fn require_parent_dir(&self, path: &VirtualPath) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if self.mirror.is_dir(&parent) {
            Ok(())
        } else if self.metadata.exists(&parent) {
            Err(Error::NotDirectory(parent.to_string()))
        } else {
            Err(Error::NotFound(parent.to_string()))
        }
    }

    /// Metadata for a file about to come into existence
    fn fresh_metadata(&self, path: &VirtualPath, permissions: u32) -> Result<FileMetadata> {
        self.require_parent_dir(path)?;
        // Blobs left behind by an unlink that failed half way belong to no
        // record and would collide with the new version ids
        self.versions.remove_all(path)?;
        Ok(FileMetadata::new(path.clone(), permissions, unix_now()))
    }

    fn latest_content(&self, meta: &FileMetadata) -> Result<Bytes> {
        meta.latest().map_or_else(
            || Ok(Bytes::new()),
            |latest| self.versions.load(meta.path(), latest.version_id),
        )
    }

    /// Persist `content` as the next version of `meta`
    ///
    /// The blob is written before the record. If the record cannot be saved
    /// the blob is discarded again; if that fails too it stays orphaned.
    fn commit(&self, meta: &mut FileMetadata, content: &[u8]) -> Result<VersionId> {
        let path = meta.path().clone();
        let version_id = meta.next_version_id();
        let blob_ref = self.versions.save(&path, version_id, content)?;

        meta.push_version(&blob_ref, content.len() as u64, unix_now());
        if let Err(e) = self.metadata.save(meta) {
            warn!(
                "Failed to record version {} of {}: {}",
                version_id, path, e
            );
            self.discard_orphan(&path, version_id);
            return Err(e);
        }
        Ok(version_id)
    }

    /// Remove a blob no record references, returning whether it is gone
    ///
    /// A blob that cannot be removed stays orphaned on disk and is logged.
    fn discard_orphan(&self, path: &VirtualPath, version_id: VersionId) -> bool {
        match self.versions.discard(path, version_id) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Version {} of {} is orphaned at {:?}: {}",
                    version_id,
                    path,
                    self.versions.blob_path(path, version_id),
                    e
                );
                false
            }
        }
    }
}

/// True if a client path ends in a slash
fn names_directory(raw: &str) -> bool {
    raw.len() > 1 && raw.ends_with('/')
}

/// The `[offset, offset + len)` window of `content`, clipped to its end
fn clip(content: &Bytes, offset: u64, len: usize) -> Bytes {
    let Ok(start) = usize::try_from(offset) else {
        return Bytes::new();
    };
    if start >= content.len() {
        return Bytes::new();
    }
    let end = start.saturating_add(len).min(content.len());
    content.slice(start..end)
}
