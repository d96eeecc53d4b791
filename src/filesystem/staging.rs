// src/filesystem/staging.rs

//! Staging area for deployment trees
//!
//! All deployment output is written below a single staging root. Paths are
//! given relative to that root and validated so nothing escapes it. Package
//! files are copied once into the staging root and then referenced from the
//! per-node directories with relative symlinks, so the tree stays valid
//! after it is mirrored to another host.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// A directory tree being assembled for deployment
#[derive(Debug, Clone)]
pub struct StagingTree {
    root: PathBuf,
}

impl StagingTree {
    /// Wrap an existing (or to-be-created) staging root
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            fs::create_dir_all(&root)?;
            debug!("Created staging root: {:?}", root);
        }
        Ok(Self { root })
    }

    /// The staging root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a relative path and join it onto the staging root
    ///
    /// `..` components and empty paths are rejected.
    pub fn safe_target_path<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(c) => normalized.push(c),
                Component::CurDir | Component::Prefix(_) | Component::RootDir => {}
                Component::ParentDir => {
                    warn!("Path traversal attempt detected: {}", path.display());
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Path traversal detected: {}", path.display()),
                    )));
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Empty path after normalization",
            )));
        }

        Ok(self.root.join(normalized))
    }

    /// Create a directory (and parents) inside the tree
    pub fn create_dir<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let target = self.safe_target_path(path)?;
        fs::create_dir_all(&target)?;
        Ok(target)
    }

    /// Copy a file into the tree, creating parent directories
    ///
    /// Copies are skipped when the destination already exists, since every
    /// staged file is content-addressed or otherwise immutable.
    pub fn copy_file<P: AsRef<Path>>(&self, source: &Path, path: P) -> Result<PathBuf> {
        let target = self.safe_target_path(path)?;
        if target.exists() {
            debug!("Already staged: {:?}", target);
            return Ok(target);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &target)?;
        debug!("Staged {:?} -> {:?}", source, target);
        Ok(target)
    }

    /// Write a file into the tree, replacing any previous content
    pub fn write_file<P: AsRef<Path>>(&self, path: P, content: &[u8]) -> Result<PathBuf> {
        let target = self.safe_target_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
        Ok(target)
    }

    /// Create `link` pointing at `target`, both relative to the staging root
    ///
    /// The symlink content is a relative path, computed from the link's
    /// directory to the target.
    pub fn link_relative<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        link: P,
        target: Q,
    ) -> Result<PathBuf> {
        let link_path = self.safe_target_path(link)?;
        let target_path = self.safe_target_path(target)?;

        if !target_path.exists() {
            return Err(Error::NotFound(format!("Staged file {}", target_path.display())));
        }

        let link_dir = link_path.parent().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "link has no parent",
            ))
        })?;
        fs::create_dir_all(link_dir)?;

        let relative = relative_path(link_dir, &target_path);

        if link_path.symlink_metadata().is_ok() {
            if link_path.is_dir() {
                debug!("Skipping symlink over directory: {:?}", link_path);
                return Ok(link_path);
            }
            fs::remove_file(&link_path)?;
        }

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&relative, &link_path)?;
        }

        #[cfg(not(unix))]
        {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "Symlinks not supported on this platform",
            )));
        }

        debug!("Linked {:?} -> {:?}", link_path, relative);
        Ok(link_path)
    }
}

/// Relative path leading from directory `from` to `to`
///
/// Both paths must be absolute or both relative to the same base.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();

    let common = from.iter().zip(to.iter()).take_while(|(a, b)| a == b).count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/s/r1/ar1/packages"), Path::new("/s/packages/r1/ar1/foo.ipk")),
            PathBuf::from("../../../packages/r1/ar1/foo.ipk")
        );
        assert_eq!(
            relative_path(Path::new("/s/a"), Path::new("/s/a/b")),
            PathBuf::from("b")
        );
    }

    #[test]
    fn test_link_relative_resolves() {
        let temp_dir = TempDir::new().unwrap();
        let tree = StagingTree::new(temp_dir.path().join("stage")).unwrap();

        tree.write_file("packages/r1/ar1/foo.ipk", b"blob").unwrap();
        let link = tree
            .link_relative("r1/ar1/packages/foo.ipk", "packages/r1/ar1/foo.ipk")
            .unwrap();

        assert_eq!(fs::read(&link).unwrap(), b"blob");
        assert!(fs::read_link(&link).unwrap().is_relative());
    }

    #[test]
    fn test_link_to_missing_target() {
        let temp_dir = TempDir::new().unwrap();
        let tree = StagingTree::new(temp_dir.path()).unwrap();
        let result = tree.link_relative("a/link", "nothing");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_path_traversal_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let tree = StagingTree::new(temp_dir.path()).unwrap();

        assert!(tree.safe_target_path("../../etc/passwd").is_err());
        assert!(tree.write_file("a/../../b", b"x").is_err());
        assert!(tree.safe_target_path("").is_err());
        assert!(tree.safe_target_path("r1/ar1/Packages.gz").is_ok());
    }

    #[test]
    fn test_copy_file_skips_existing() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("src");
        fs::write(&source, b"first").unwrap();

        let tree = StagingTree::new(temp_dir.path().join("stage")).unwrap();
        let target = tree.copy_file(&source, "x/y").unwrap();
        fs::write(&source, b"second").unwrap();
        tree.copy_file(&source, "x/y").unwrap();

        assert_eq!(fs::read(target).unwrap(), b"first");
    }
}
