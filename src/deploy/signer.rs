// src/deploy/signer.rs

//! Detached signatures for package indices
//!
//! Devices verify `Packages.sig` against `Packages.gz` before trusting an
//! index. Signing shells out to `openssl dgst`; the private key must be
//! readable by its owner only.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Signature filename written next to each index
pub const SIGNATURE_FILE: &str = "Packages.sig";

/// Produces a detached signature for a file
pub trait Signer {
    /// Sign `file`, returning the path of the signature written
    fn sign(&self, file: &Path) -> Result<PathBuf>;
}

/// Signs with `openssl dgst -sha256 -sign <key>`
#[derive(Debug, Clone)]
pub struct OpensslSigner {
    key: PathBuf,
    program: PathBuf,
}

impl OpensslSigner {
    /// Validate the key and locate the `openssl` executable
    pub fn new(key: &Path, program: &str) -> Result<Self> {
        check_key(key)?;
        let program = which::which(program).map_err(|e| {
            Error::ExternalToolError(format!("Cannot find signing tool '{}': {}", program, e))
        })?;
        Ok(Self {
            key: key.to_path_buf(),
            program,
        })
    }

    pub fn key(&self) -> &Path {
        &self.key
    }
}

/// The key must exist and be exactly owner-read-only (0400)
pub fn check_key(key: &Path) -> Result<()> {
    if !key.is_file() {
        return Err(Error::NotFound(format!("Signing key {}", key.display())));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(key)?.permissions().mode() & 0o777;
        if mode != 0o400 {
            return Err(Error::PermissionError(format!(
                "Signing key {} has mode {:o}; it must be 400",
                key.display(),
                mode
            )));
        }
    }

    Ok(())
}

impl Signer for OpensslSigner {
    fn sign(&self, file: &Path) -> Result<PathBuf> {
        check_key(&self.key)?;

        let signature = file.with_file_name(SIGNATURE_FILE);
        let output = Command::new(&self.program)
            .arg("dgst")
            .arg("-sha256")
            .arg("-sign")
            .arg(&self.key)
            .arg("-out")
            .arg(&signature)
            .arg(file)
            .output()
            .map_err(|e| Error::ExternalToolError(format!("openssl failed to start: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ExternalToolError(format!(
                "Failed to sign {}: {}",
                file.display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        debug!("Signed {}", file.display());
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let result = OpensslSigner::new(&temp_dir.path().join("nope.key"), "openssl");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_group_readable_key_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let key = temp_dir.path().join("signing.key");
        fs::write(&key, b"not really a key").unwrap();
        fs::set_permissions(&key, fs::Permissions::from_mode(0o640)).unwrap();

        let result = OpensslSigner::new(&key, "openssl");
        assert!(matches!(result, Err(Error::PermissionError(_))));

        fs::set_permissions(&key, fs::Permissions::from_mode(0o400)).unwrap();
        check_key(&key).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_check_key_rejects_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let key = temp_dir.path().join("signing.key");
        fs::write(&key, b"not really a key").unwrap();
        fs::set_permissions(&key, fs::Permissions::from_mode(0o644)).unwrap();

        assert!(matches!(check_key(&key), Err(Error::PermissionError(_))));
    }

    #[test]
    fn test_check_key_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = check_key(&temp_dir.path().join("absent.key"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_missing_tool() {
        let temp_dir = TempDir::new().unwrap();
        let key = temp_dir.path().join("signing.key");
        fs::write(&key, b"key").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key, fs::Permissions::from_mode(0o400)).unwrap();
        }

        let result = OpensslSigner::new(&key, "firmrel-no-such-signing-tool");
        assert!(matches!(result, Err(Error::ExternalToolError(_))));
    }
}
