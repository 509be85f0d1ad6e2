//! VerFS Storage - persistence primitives for the versioned filesystem
//!
//! This crate implements the three on-disk components the operation layer
//! sequences:
//! - Metadata store: one JSON record per virtual file (attributes + version list)
//! - Version store: one immutable blob per (virtual file, version id)
//! - Directory mirror: keeps both physical hierarchies shaped like the virtual tree
//!
//! None of these components lock; callers serialize access per path.

pub mod layout;
pub mod metadata;
pub mod mirror;
pub mod version;

// Re-exports
pub use layout::{StorageLayout, VERSION_FILE_PREFIX};
pub use metadata::{FileMetadata, MetadataStore, VersionInfo};
pub use mirror::DirectoryMirror;
pub use version::VersionStore;
