// src/packages/ipk.rs

//! opkg (.ipk) package parser
//!
//! An ipk is an outer archive (gzipped tar on current OpenWrt, `ar` on
//! older builds) holding `debian-binary`, `data.tar.gz` and
//! `control.tar.gz`. Only the `control` file inside `control.tar.gz` is
//! read: its `Package`, `Version` and `Architecture` fields give the
//! package identity, and the full text is kept for the package index.

use crate::error::{Error, Result};
use crate::packages::types::Package;
use flate2::read::GzDecoder;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::LazyLock;
use tar::Archive;
use tracing::debug;

/// Control member of the outer archive
const CONTROL_ARCHIVE: &str = "control.tar.gz";

/// Control file inside the control archive
const CONTROL_FILE: &str = "control";

/// Magic bytes of a gzip stream
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// Magic bytes of an `ar` archive
const AR_MAGIC: &[u8] = b"!<arch>\n";

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    // A field line; continuation lines start with whitespace and never match
    Regex::new(r"^([\w-]+):\s*(.*)$").expect("valid regex")
});

/// Metadata extracted from a package blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPackage {
    pub package: Package,
    /// Raw control file text, used verbatim in the package index
    pub control: String,
}

/// Extracts package metadata from a raw package blob
pub trait PackageParser {
    fn parse(&self, content: &[u8]) -> Result<ParsedPackage>;
}

/// Parser for opkg `.ipk` packages
#[derive(Debug, Default, Clone, Copy)]
pub struct IpkParser;

impl IpkParser {
    pub fn new() -> Self {
        Self
    }

    /// Locate and read `control.tar.gz` from the outer archive
    fn control_archive(content: &[u8]) -> Result<Vec<u8>> {
        if content.starts_with(GZIP_MAGIC) {
            let mut archive = Archive::new(GzDecoder::new(Cursor::new(content)));
            find_tar_member(&mut archive, CONTROL_ARCHIVE)
        } else if content.starts_with(AR_MAGIC) {
            find_ar_member(content, CONTROL_ARCHIVE)
        } else {
            Err(Error::ParseError(
                "not an ipk: expected a gzipped tar or ar archive".to_string(),
            ))
        }
    }
}

impl PackageParser for IpkParser {
    fn parse(&self, content: &[u8]) -> Result<ParsedPackage> {
        let control_tar = Self::control_archive(content)?;
        let mut archive = Archive::new(GzDecoder::new(Cursor::new(control_tar)));
        let control_bytes = find_tar_member(&mut archive, CONTROL_FILE)?;
        let control = String::from_utf8(control_bytes)
            .map_err(|e| Error::ParseError(format!("control file is not UTF-8: {}", e)))?;

        let package = package_from_control(&control)?;
        debug!("Parsed package {}", package);

        Ok(ParsedPackage { package, control })
    }
}

/// Package identity from control text (`Package`, `Version`, `Architecture`)
pub fn package_from_control(control: &str) -> Result<Package> {
    let fields = parse_control_fields(control);
    let field = |name: &str| {
        fields
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
            .ok_or_else(|| Error::ParseError(format!("control file has no {} field", name)))
    };

    Ok(Package::new(field("Package")?, field("Version")?, field("Architecture")?))
}

/// Parse `Key: value` lines of a control paragraph
///
/// Continuation lines are ignored; the first occurrence of a key wins.
pub fn parse_control_fields(control: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in control.lines() {
        if let Some(caps) = FIELD_RE.captures(line) {
            fields
                .entry(caps[1].to_string())
                .or_insert_with(|| caps[2].trim().to_string());
        }
    }
    fields
}

/// Whether a tar/ar member path names `wanted` (ignoring a leading `./`)
fn member_matches(path: &str, wanted: &str) -> bool {
    path.trim_start_matches("./").trim_end_matches('/') == wanted
}

fn find_tar_member<R: Read>(archive: &mut Archive<R>, wanted: &str) -> Result<Vec<u8>> {
    let entries = archive
        .entries()
        .map_err(|e| Error::ParseError(format!("Failed to read archive entries: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::ParseError(format!("Failed to read archive entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::ParseError(format!("Failed to get entry path: {}", e)))?
            .to_string_lossy()
            .to_string();

        if member_matches(&path, wanted) {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(content);
        }
    }

    Err(Error::ParseError(format!("archive has no {} member", wanted)))
}

fn find_ar_member(content: &[u8], wanted: &str) -> Result<Vec<u8>> {
    let mut archive = ar::Archive::new(Cursor::new(content));
    while let Some(entry) = archive.next_entry() {
        let mut entry =
            entry.map_err(|e| Error::ParseError(format!("Failed to read ar entry: {}", e)))?;
        let name = String::from_utf8_lossy(entry.header().identifier()).to_string();
        if member_matches(&name, wanted) {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            return Ok(data);
        }
    }

    Err(Error::ParseError(format!("archive has no {} member", wanted)))
}
