// src/filesystem/cas.rs

//! Content-addressable storage for package blobs
//!
//! Each blob is stored flat as `<sha256>.<ext>` inside the store directory.
//! Identical content always maps to the same file, so storing is
//! deduplicating, and the filename doubles as the integrity check: any byte
//! changed after storage makes [`ContentStore::verify_all`] fail.

use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extension used for stored package blobs
pub const PACKAGE_EXTENSION: &str = "ipk";

/// Content-addressable storage manager for one release
#[derive(Debug, Clone)]
pub struct ContentStore {
    /// Directory holding the blobs (e.g. `releases/<name>/packages`)
    root: PathBuf,
    /// Extension appended to every hash to form a filename
    extension: String,
}

impl ContentStore {
    /// Open a store rooted at `root` storing `.ipk` blobs
    ///
    /// The directory is created lazily on the first [`put`](Self::put).
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_extension(root, PACKAGE_EXTENSION)
    }

    /// Open a store with a custom blob extension
    pub fn with_extension<P: AsRef<Path>>(root: P, extension: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extension: extension.to_string(),
        }
    }

    /// Directory holding the blobs
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store content and return its hash
    ///
    /// If the content already exists this is a no-op.
    pub fn put(&self, content: &[u8]) -> Result<String> {
        let hash = hash::sha256(content);
        let path = self.path(&hash);

        if path.exists() {
            debug!("Content already in store: {}", hash);
            return Ok(hash);
        }

        fs::create_dir_all(&self.root)?;

        // Write to a temp name, then rename into place
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
        }

        debug!("Stored content: {} ({} bytes)", hash, content.len());
        Ok(hash)
    }

    /// Filesystem path of the blob for `hash`
    pub fn path(&self, hash: &str) -> PathBuf {
        self.root.join(format!("{}.{}", hash, self.extension))
    }

    /// Whether a blob with this hash is stored
    pub fn contains(&self, hash: &str) -> bool {
        self.path(hash).is_file()
    }

    /// Read a blob, verifying its content against the hash
    pub fn read(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.path(hash);
        if !path.is_file() {
            return Err(Error::NotFound(format!("Blob {} in {}", hash, self.root.display())));
        }

        let content = fs::read(&path)?;
        let actual = hash::sha256(&content);
        if actual != hash {
            return Err(Error::IntegrityError(format!(
                "Hash mismatch for {}: expected {}, got {}",
                path.display(),
                hash,
                actual
            )));
        }
        Ok(content)
    }

    /// Every hash currently stored, sorted
    pub fn hashes(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let suffix = format!(".{}", self.extension);
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(hash) = name.strip_suffix(&suffix) {
                hashes.push(hash.to_string());
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Check every stored blob against its filename-encoded hash
    ///
    /// Detects corruption and manual tampering; the first mismatch is
    /// returned as an `IntegrityError`.
    pub fn verify_all(&self) -> Result<()> {
        let hashes = self.hashes()?;
        for hash in &hashes {
            hash::verify_file(&self.path(hash), hash, HashAlgorithm::Sha256)?;
        }
        debug!("Verified {} blobs in {}", hashes.len(), self.root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::new(temp_dir.path().join("packages"));

        let first = store.put(b"package bytes").unwrap();
        let second = store.put(b"package bytes").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.hashes().unwrap(), vec![first.clone()]);
        assert!(store.path(&first).ends_with(format!("{}.ipk", first)));
    }

    #[test]
    fn test_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::new(temp_dir.path());

        let hash = store.put(b"Test content").unwrap();
        assert!(store.contains(&hash));
        assert_eq!(store.read(&hash).unwrap(), b"Test content");
    }

    #[test]
    fn test_read_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::new(temp_dir.path());
        assert!(matches!(store.read("abc"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_verify_all_detects_tampering() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::new(temp_dir.path());

        let hash = store.put(b"original").unwrap();
        store.put(b"another").unwrap();
        store.verify_all().unwrap();

        let path = store.path(&hash);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        }
        fs::write(&path, b"tampered").unwrap();

        assert!(matches!(store.verify_all(), Err(Error::IntegrityError(_))));
        assert!(matches!(store.read(&hash), Err(Error::IntegrityError(_))));
    }

    #[test]
    fn test_hashes_ignores_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = ContentStore::new(temp_dir.path());
        store.put(b"x").unwrap();
        fs::write(temp_dir.path().join("README"), b"not a blob").unwrap();

        assert_eq!(store.hashes().unwrap().len(), 1);
    }
}
