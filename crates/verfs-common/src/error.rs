//! Error types for VerFS
//!
//! This module defines the error taxonomy shared by the stores and the
//! operation layer, and its mapping onto POSIX errno values for the
//! filesystem adapter.

use crate::types::VirtualPathError;
use std::collections::TryReserveError;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Common result type for VerFS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for VerFS
#[derive(Debug, Error)]
pub enum Error {
    // Lookup errors
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("not a directory: {0}")]
    NotDirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] VirtualPathError),

    // Access errors
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    // Storage errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt metadata record for {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("out of memory: failed to allocate {size} bytes")]
    OutOfMemory { size: u64 },

    #[error("file too large: {size} bytes exceeds limit of {max_size} bytes")]
    FileTooLarge { size: u64, max_size: u64 },

    // Internal errors
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a corrupt-record error
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Classify an I/O error raised while touching `path`.
    ///
    /// Kinds with a dedicated variant are mapped onto it so callers can
    /// match on them; everything else stays an [`Error::Io`].
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        let name = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(name),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(name),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(name),
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty(name),
            io::ErrorKind::IsADirectory => Self::IsDirectory(name),
            io::ErrorKind::NotADirectory => Self::NotDirectory(name),
            _ => Self::Io(err),
        }
    }

    /// Map an allocation failure of `size` bytes
    #[must_use]
    pub fn out_of_memory(size: u64, _source: TryReserveError) -> Self {
        Self::OutOfMemory { size }
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Get the POSIX errno for the filesystem adapter
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::AlreadyExists(_) => libc::EEXIST,
            Self::IsDirectory(_) => libc::EISDIR,
            Self::NotDirectory(_) => libc::ENOTDIR,
            Self::NotEmpty(_) => libc::ENOTEMPTY,
            Self::InvalidPath(_) => libc::EINVAL,
            Self::PermissionDenied(_) => libc::EACCES,
            Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Self::OutOfMemory { .. } => libc::ENOMEM,
            Self::FileTooLarge { .. } => libc::EFBIG,
            Self::Corrupt { .. } | Self::Serialization(_) | Self::Configuration(_) => libc::EIO,
        }
    }
}
