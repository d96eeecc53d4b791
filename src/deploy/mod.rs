// src/deploy/mod.rs

//! Deployment
//!
//! [`deploy`] validates the whole repository, assembles a fresh staging
//! tree, then mirrors it to the destination only after the operator has
//! seen the dry-run diff and confirmed. Validation is the only gate; a
//! failure in any later stage leaves the half-built staging tree in place
//! for inspection.

mod builder;
pub mod index;
mod signer;
mod transfer;

pub use builder::{BuildStats, DeploymentBuilder};
pub use signer::{OpensslSigner, SIGNATURE_FILE, Signer, check_key};
pub use transfer::{RsyncTransfer, Transfer};

use crate::error::Result;
use crate::experiments::ExperimentCatalog;
use crate::groups::GroupDirectory;
use crate::packages::PackageParser;
use crate::release::Release;
use crate::tree;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of every staging directory name
pub const STAGING_PREFIX: &str = "firmrel-deploy-";

/// Operator decisions during a deployment
pub trait Confirm {
    /// Copy the staged tree, given the dry-run output?
    fn confirm_copy(&mut self, destination: &str, changes: &str) -> Result<bool>;

    /// Remove the staging tree afterwards?
    fn confirm_cleanup(&mut self, staging_root: &Path) -> Result<bool>;
}

/// Answers every question with the same fixed values
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswers {
    pub copy: bool,
    pub cleanup: bool,
}

impl Confirm for FixedAnswers {
    fn confirm_copy(&mut self, _destination: &str, _changes: &str) -> Result<bool> {
        Ok(self.copy)
    }

    fn confirm_cleanup(&mut self, _staging_root: &Path) -> Result<bool> {
        Ok(self.cleanup)
    }
}

/// Where to stage and where to copy to
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Directory the staging tree is created in
    pub staging_parent: PathBuf,
    /// Mirror target; `None` stages only
    pub destination: Option<String>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            staging_parent: std::env::temp_dir(),
            destination: None,
        }
    }
}

/// Outcome of a deployment
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub staging_root: PathBuf,
    pub stats: BuildStats,
    /// Dry-run output, when a destination was given
    pub changes: Option<String>,
    pub copied: bool,
    pub staging_removed: bool,
}

/// Collaborators a deployment runs with
pub struct DeployTools<'a> {
    pub parser: &'a dyn PackageParser,
    pub signer: Option<&'a dyn Signer>,
    pub transfer: Option<&'a dyn Transfer>,
}

/// Validate, stage, diff, and (after confirmation) copy
pub fn deploy(
    releases: &[Release],
    groups: &GroupDirectory,
    experiments: &ExperimentCatalog,
    tools: DeployTools<'_>,
    options: &DeployOptions,
    confirm: &mut dyn Confirm,
) -> Result<DeployReport> {
    info!("Validating {} releases before deployment", releases.len());
    tree::check_all(releases, experiments)?;

    fs::create_dir_all(&options.staging_parent)?;
    let staging_root = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&options.staging_parent)?
        .keep();
    info!("Staging deployment in {}", staging_root.display());

    let builder =
        DeploymentBuilder::new(releases, groups, experiments, tools.parser, &staging_root)?;
    let stats = builder.build(tools.signer)?;

    let mut report = DeployReport {
        staging_root,
        stats,
        changes: None,
        copied: false,
        staging_removed: false,
    };

    let (Some(destination), Some(transfer)) = (options.destination.as_deref(), tools.transfer)
    else {
        info!("No destination given; deployment staged only");
        return Ok(report);
    };

    let changes = transfer.dry_run(&report.staging_root, destination)?;
    if confirm.confirm_copy(destination, &changes)? {
        transfer.copy(&report.staging_root, destination)?;
        report.copied = true;
        info!("Deployed to {}", destination);
    } else {
        info!("Copy to {} declined", destination);
    }
    report.changes = Some(changes);

    if confirm.confirm_cleanup(&report.staging_root)? {
        fs::remove_dir_all(&report.staging_root)?;
        report.staging_removed = true;
    }

    Ok(report)
}
