// src/filesystem/mod.rs

//! Filesystem operations for firmrel
//!
//! This module provides:
//! - Content-addressable storage for package blobs, one store per release
//! - Space-delimited record tables, the on-disk format of every persisted set
//! - A staging tree that deployment output is assembled in
//!
//! Package blobs are stored by their SHA-256 hash, so duplicate imports are
//! free and tampering is detectable.

mod cas;
mod staging;
pub mod table;

pub use cas::{ContentStore, PACKAGE_EXTENSION};
pub use staging::{StagingTree, relative_path};
pub use table::Record;
