// src/packages/types.rs

//! Package identity types
//!
//! A package is identified by (name, version, architecture). Once its blob
//! is in a release's content store it becomes a [`FingerprintedPackage`],
//! the identity plus the SHA-256 of the blob.

use crate::error::{Error, Result};
use crate::filesystem::Record;
use std::fmt;

/// A package architecture, possibly the wildcard `all`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Architecture(String);

impl Architecture {
    /// Wildcard meaning "every architecture declared for the release"
    pub const ALL: &'static str = "all";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `all` wildcard
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::ALL
    }

    /// Equal, or either side is the wildcard
    pub fn is_compatible(&self, other: &Architecture) -> bool {
        self == other || self.is_wildcard() || other.is_wildcard()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Architecture {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Architecture {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Record for Architecture {
    const FIELDS: &'static [&'static str] = &["architecture"];

    fn to_fields(&self) -> Vec<String> {
        vec![self.0.clone()]
    }

    fn from_fields(fields: &[&str]) -> Result<Self> {
        Ok(Self::from(fields[0]))
    }
}

/// Package identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub architecture: Architecture,
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<Architecture>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            architecture: architecture.into(),
        }
    }

    /// Conventional opkg filename, `<name>_<version>_<arch>.ipk`
    pub fn filename(&self) -> String {
        format!("{}_{}_{}.ipk", self.name, self.version, self.architecture)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.architecture)
    }
}

impl Record for Package {
    const FIELDS: &'static [&'static str] = &["name", "version", "architecture"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.version.clone(),
            self.architecture.to_string(),
        ]
    }

    fn from_fields(fields: &[&str]) -> Result<Self> {
        Ok(Self::new(fields[0], fields[1], fields[2]))
    }
}

/// A package whose blob is stored, addressed by its SHA-256
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FingerprintedPackage {
    pub name: String,
    pub version: String,
    pub architecture: Architecture,
    pub hash: String,
}

impl FingerprintedPackage {
    pub fn new(package: Package, hash: impl Into<String>) -> Self {
        Self {
            name: package.name,
            version: package.version,
            architecture: package.architecture,
            hash: hash.into(),
        }
    }

    /// The bare identity, without the fingerprint
    pub fn package(&self) -> Package {
        Package {
            name: self.name.clone(),
            version: self.version.clone(),
            architecture: self.architecture.clone(),
        }
    }

    pub fn filename(&self) -> String {
        self.package().filename()
    }
}

impl Record for FingerprintedPackage {
    const FIELDS: &'static [&'static str] = &["name", "version", "architecture", "hash"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.version.clone(),
            self.architecture.to_string(),
            self.hash.clone(),
        ]
    }

    fn from_fields(fields: &[&str]) -> Result<Self> {
        if !crate::hash::is_valid_digest(crate::hash::HashAlgorithm::Sha256, fields[3]) {
            return Err(Error::ParseError(format!(
                "'{}' is not a SHA-256 digest",
                fields[3]
            )));
        }
        Ok(Self::new(Package::new(fields[0], fields[1], fields[2]), fields[3]))
    }
}
