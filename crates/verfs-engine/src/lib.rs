//! VerFS Engine - the operation layer of the versioned filesystem
//!
//! Maps filesystem-style calls (stat, list, open, read, write, create,
//! unlink, mkdir, rmdir) onto metadata and version store accesses:
//! - Every write produces a new, fully materialized version
//! - Mutations of a path run under a per-path exclusive lock
//! - Reads of a path share the lock and never see a half-applied write

pub mod fs;
pub mod lock;
mod patch;

// Re-exports
pub use fs::VersionedFs;
pub use lock::{PathGuard, PathLockTable};
pub use verfs_storage::VersionInfo;
