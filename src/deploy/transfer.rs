// src/deploy/transfer.rs

//! Mirroring the staged tree to its destination
//!
//! The destination is only ever touched by [`Transfer::copy`]; a dry run
//! lists what would change so the operator can confirm first.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Moves a staged tree to a (possibly remote) destination
pub trait Transfer {
    /// Describe what `copy` would change, without changing anything
    fn dry_run(&self, source: &Path, destination: &str) -> Result<String>;

    /// Make `destination` an exact mirror of `source`
    fn copy(&self, source: &Path, destination: &str) -> Result<()>;
}

/// Mirrors with `rsync -a --delete --itemize-changes`
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    program: PathBuf,
}

impl RsyncTransfer {
    /// Locate the `rsync` executable
    pub fn new(program: &str) -> Result<Self> {
        let program = which::which(program).map_err(|e| {
            Error::ExternalToolError(format!("Cannot find transfer tool '{}': {}", program, e))
        })?;
        Ok(Self { program })
    }

    fn run(&self, source: &Path, destination: &str, dry_run: bool) -> Result<String> {
        // Trailing slash: copy the directory's contents, not the directory
        let source = format!("{}/", source.display());

        let mut command = Command::new(&self.program);
        command.args(["-a", "--delete", "--itemize-changes"]);
        if dry_run {
            command.arg("--dry-run");
        }
        command.arg(&source).arg(destination);

        debug!("Running {:?}", command);
        let output = command
            .output()
            .map_err(|e| Error::ExternalToolError(format!("rsync failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ExternalToolError(format!(
                "rsync to {} failed: {}",
                destination,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Transfer for RsyncTransfer {
    fn dry_run(&self, source: &Path, destination: &str) -> Result<String> {
        self.run(source, destination, true)
    }

    fn copy(&self, source: &Path, destination: &str) -> Result<()> {
        let changes = self.run(source, destination, false)?;
        info!("Copied {} ({} changes)", destination, changes.lines().count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool() {
        let result = RsyncTransfer::new("firmrel-no-such-transfer-tool");
        assert!(matches!(result, Err(Error::ExternalToolError(_))));
    }
}
