// src/lib.rs

//! Firmware release manager
//!
//! Maintains a repository of firmware releases for fleets of embedded
//! routers and turns it into a static, signed deployment tree served to
//! the devices.
//!
//! # Architecture
//!
//! - Content-addressed storage: every package blob is kept once, by SHA-256
//! - Releases: the package and image inventory of one firmware build
//! - Groups: named device sets that target upgrades and experiments
//! - Experiments: opt-in package sets with per-group flags
//! - Deployment: validate everything, stage a symlinked tree, then mirror

pub mod config;
pub mod deploy;
mod error;
pub mod experiments;
pub mod filesystem;
pub mod groups;
pub mod hash;
pub mod packages;
pub mod release;
pub mod resolver;
pub mod tree;

pub use config::Config;
pub use error::{Error, Result};
pub use experiments::{Experiment, ExperimentCatalog, ExperimentPackage, Flag};
pub use groups::{GroupDirectory, Node, Target};
pub use hash::{HashAlgorithm, Hasher};
pub use packages::{Architecture, FingerprintedPackage, Package};
pub use release::{BuildTree, Release, UpgradePin};
pub use tree::ReleaseTree;
