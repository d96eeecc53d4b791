// src/hash.rs

//! Hashing for package fingerprints and index checksums
//!
//! Two algorithms are in play:
//! - **SHA-256**: fingerprints of stored packages and images; the hex digest
//!   doubles as the content-store filename
//! - **MD5**: the `MD5Sum` field opkg expects in a `Packages` index
//!
//! | Use Case | Algorithm |
//! |----------|-----------|
//! | Content store addressing | SHA-256 |
//! | Image fingerprints | SHA-256 |
//! | `Packages` index `SHA256sum` | SHA-256 |
//! | `Packages` index `MD5Sum` | MD5 |

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-256 (256-bit cryptographic hash)
    #[default]
    Sha256,

    /// MD5 (128-bit, only for opkg index compatibility)
    Md5,
}

impl HashAlgorithm {
    /// Get the hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Md5 => 16,
        }
    }

    /// Get the hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Get the algorithm name as a string
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Incremental hasher over any supported algorithm
pub struct Hasher {
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Md5(Md5),
}

impl Hasher {
    /// Create a new hasher with the specified algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
        };
        Self { state }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(data),
            HasherState::Md5(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the lowercase hex digest
    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            HasherState::Md5(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Compute the hex digest of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute the hex digest of everything a reader yields
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Compute the hex digest of a file, streaming its contents
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    Ok(hash_reader(algorithm, &mut file)?)
}

/// SHA-256 fingerprint of a byte slice
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data)
}

/// MD5 digest of a byte slice
#[inline]
pub fn md5(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Md5, data)
}

/// Check that a string looks like a digest for the given algorithm
pub fn is_valid_digest(algorithm: HashAlgorithm, value: &str) -> bool {
    value.len() == algorithm.hex_len() && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Verify a file's content against an expected digest
///
/// Returns `IntegrityError` naming both digests on mismatch.
pub fn verify_file(path: &Path, expected: &str, algorithm: HashAlgorithm) -> Result<()> {
    let actual = hash_file(algorithm, path)?;
    if actual == expected.to_lowercase() {
        Ok(())
    } else {
        Err(Error::IntegrityError(format!(
            "{} mismatch for {}: expected {}, got {}",
            algorithm,
            path.display(),
            expected,
            actual
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_sha256_hash() {
        let hash = sha256(b"Hello, World!");
        assert_eq!(
            hash,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(hash.len(), HashAlgorithm::Sha256.hex_len());
    }

    #[test]
    fn test_md5_hash() {
        assert_eq!(md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data = vec![7u8; 20_000];
        let from_reader = hash_reader(HashAlgorithm::Sha256, &mut Cursor::new(&data)).unwrap();
        assert_eq!(from_reader, sha256(&data));
    }

    #[test]
    fn test_verify_file_mismatch() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("blob");
        std::fs::write(&path, b"content").unwrap();

        assert!(verify_file(&path, &sha256(b"content"), HashAlgorithm::Sha256).is_ok());
        let err = verify_file(&path, &sha256(b"other"), HashAlgorithm::Sha256).unwrap_err();
        assert!(matches!(err, Error::IntegrityError(_)));
    }

    #[test]
    fn test_is_valid_digest() {
        assert!(is_valid_digest(HashAlgorithm::Sha256, &sha256(b"x")));
        assert!(!is_valid_digest(HashAlgorithm::Sha256, "abc"));
        assert!(!is_valid_digest(HashAlgorithm::Md5, &"z".repeat(32)));
    }
}
