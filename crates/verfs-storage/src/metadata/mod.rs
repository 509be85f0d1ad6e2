//! Metadata storage
//!
//! One record per virtual file, holding its attributes and the ordered list
//! of version references:
//!
//! ```text
//! {
//!   "filename": "docs/a.md",
//!   "version_count": 2,
//!   "attributes": { "st_mode": 33188, "st_size": 11, "st_mtime": 1700000000 },
//!   "version_list": [
//!     { "version_id": 1, "timestamp": 1699999990, "data_pointer": ".../version_1" },
//!     { "version_id": 2, "timestamp": 1700000000, "data_pointer": ".../version_2" }
//!   ]
//! }
//! ```
//!
//! # Write Path
//! 1. Serialize the full record (pretty JSON)
//! 2. Write it to a hidden scratch file next to the record
//! 3. Rename over the previous record
//!
//! # Read Path
//! 1. Parse against the strict record schema
//! 2. Validate structure in one pass (count, id sequence, type bits, size)
//! 3. Build the in-memory [`FileMetadata`]

mod record;
mod store;
mod types;

pub use store::MetadataStore;
pub use types::{FileMetadata, VersionInfo};
