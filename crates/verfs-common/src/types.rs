//! Core type definitions for VerFS
//!
//! This module defines the fundamental types used throughout the system:
//! virtual paths, version identifiers, file attributes and directory entries.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// File type mask
pub const S_IFMT: u32 = 0o170_000;
/// Regular file type bits
pub const S_IFREG: u32 = 0o100_000;
/// Directory type bits
pub const S_IFDIR: u32 = 0o040_000;
/// Permission bits (including setuid/setgid/sticky)
pub const PERMISSION_MASK: u32 = 0o7777;
/// Owner write permission bit
pub const S_IWUSR: u32 = 0o200;

/// Permissions reported for the synthetic root directory
pub const ROOT_PERMISSIONS: u32 = 0o755;

/// Permissions given to files created implicitly by a write
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

/// Maximum length of a single path component
pub const MAX_COMPONENT_LEN: usize = 255;

/// Current time in seconds since the UNIX epoch
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// A path in the virtual filesystem, always rooted at `/`
///
/// Construction normalizes away a trailing slash and rejects empty, `.`
/// and `..` components, so two equal paths always name the same entry.
/// Callers that give a trailing slash its directory-only meaning must
/// check the raw string themselves.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The virtual root `/`
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and validate a virtual path
    pub fn new(path: impl Into<String>) -> Result<Self, VirtualPathError> {
        let mut path = path.into();
        if path.is_empty() {
            return Err(VirtualPathError::Empty);
        }
        if !path.starts_with('/') {
            return Err(VirtualPathError::NotAbsolute(path));
        }
        if path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        if path != "/" {
            for component in path[1..].split('/') {
                Self::validate_component(component)?;
            }
        }
        Ok(Self(path))
    }

    fn validate_component(component: &str) -> Result<(), VirtualPathError> {
        match component {
            "" => Err(VirtualPathError::EmptyComponent),
            "." | ".." => Err(VirtualPathError::DotComponent(component.to_string())),
            c if c.len() > MAX_COMPONENT_LEN => Err(VirtualPathError::ComponentTooLong(c.len())),
            c if c.contains('\0') => Err(VirtualPathError::InvalidChar('\0')),
            _ => Ok(()),
        }
    }

    /// Get the path as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the virtual root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The path without its leading slash (empty for the root)
    #[must_use]
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }

    /// Path components, root first
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.relative().split('/').filter(|c| !c.is_empty())
    }

    /// Last component, `None` for the root
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// Parent directory, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append a single component
    pub fn join(&self, name: &str) -> Result<Self, VirtualPathError> {
        Self::validate_component(name)?;
        if name.contains('/') {
            return Err(VirtualPathError::InvalidChar('/'));
        }
        if self.is_root() {
            Ok(Self(format!("/{name}")))
        } else {
            Ok(Self(format!("{}/{name}", self.0)))
        }
    }

    /// True if any component starts with `prefix`
    #[must_use]
    pub fn has_component_prefixed(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.components().any(|c| c.starts_with(prefix))
    }
}

impl fmt::Debug for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPath({:?})", self.0)
    }
}

impl TryFrom<&str> for VirtualPath {
    type Error = VirtualPathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Errors that can occur when creating a virtual path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VirtualPathError {
    #[error("path is empty")]
    Empty,
    #[error("path must be absolute: {0}")]
    NotAbsolute(String),
    #[error("path contains an empty component")]
    EmptyComponent,
    #[error("path contains a relative component: {0}")]
    DotComponent(String),
    #[error("path component is {0} bytes, limit is 255")]
    ComponentTooLong(usize),
    #[error("path contains invalid character: {0:?}")]
    InvalidChar(char),
    #[error("path component uses the reserved prefix {0:?}")]
    ReservedPrefix(String),
    #[error("directory name uses the reserved suffix: {0}")]
    ReservedSuffix(String),
}

/// Identifier of one version of a file, starting at 1
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct VersionId(u64);

impl VersionId {
    /// The id of the first version of every file
    pub const FIRST: Self = Self(1);

    /// Wrap a raw id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id that follows this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Id of the version stored at `index` in a version list
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index as u64 + 1)
    }

    /// Position of this version in a version list
    #[must_use]
    pub fn index(self) -> Option<usize> {
        self.0.checked_sub(1).and_then(|i| usize::try_from(i).ok())
    }
}

/// Kind of a directory entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
}

/// POSIX-style attributes reported by stat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// File type and permission bits
    pub mode: u32,
    /// Size in bytes of the latest version
    pub size: u64,
    /// Last modification time (seconds since the UNIX epoch)
    pub mtime: i64,
    /// Hard link count
    pub nlink: u32,
}

impl FileAttributes {
    /// Attributes of a new, empty regular file
    #[must_use]
    pub const fn regular(permissions: u32, mtime: i64) -> Self {
        Self {
            mode: S_IFREG | (permissions & PERMISSION_MASK),
            size: 0,
            mtime,
            nlink: 1,
        }
    }

    /// Attributes of a directory
    #[must_use]
    pub const fn directory(permissions: u32, mtime: i64) -> Self {
        Self {
            mode: S_IFDIR | (permissions & PERMISSION_MASK),
            size: 0,
            mtime,
            nlink: 2,
        }
    }

    /// Entry kind derived from the type bits
    #[must_use]
    pub const fn kind(&self) -> FileKind {
        if self.mode & S_IFMT == S_IFDIR {
            FileKind::Directory
        } else {
            FileKind::File
        }
    }

    /// Permission bits only
    #[must_use]
    pub const fn permissions(&self) -> u32 {
        self.mode & PERMISSION_MASK
    }

    /// True if the owner write bit is set
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.mode & S_IWUSR != 0
    }
}

/// An entry returned by a directory listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name, without any storage suffix
    pub name: String,
    /// File or directory
    pub kind: FileKind,
}

/// Access mode requested by open
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Decode the access mode from `open(2)` flags
    #[must_use]
    pub const fn from_flags(flags: i32) -> Self {
        match flags & libc::O_ACCMODE {
            libc::O_RDONLY => Self::ReadOnly,
            libc::O_WRONLY => Self::WriteOnly,
            _ => Self::ReadWrite,
        }
    }

    /// True if the mode asks for write access
    #[must_use]
    pub const fn wants_write(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}
