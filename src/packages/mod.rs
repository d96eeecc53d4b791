// src/packages/mod.rs

//! Package support for firmrel
//!
//! This module provides the package identity types, the `.ipk` metadata
//! parser behind the [`PackageParser`] trait, and an HTTP fetcher for
//! importing packages by URL.

pub mod fetch;
pub mod ipk;
pub mod types;

pub use fetch::PackageFetcher;
pub use ipk::{IpkParser, PackageParser, ParsedPackage, package_from_control};
pub use types::{Architecture, FingerprintedPackage, Package};
