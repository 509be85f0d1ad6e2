//! VerFS Common - Shared types and utilities
//!
//! This crate provides the error taxonomy, configuration and core types
//! (virtual paths, version ids, file attributes) used by every VerFS
//! component.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LoggingConfig, StorageConfig};
pub use error::{Error, Result};
pub use types::*;
