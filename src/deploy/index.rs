// src/deploy/index.rs

//! opkg package indices
//!
//! Each directory of packages in the deployment tree gets a `Packages.gz`:
//! one control paragraph per `.ipk`, sorted by filename, with the download
//! fields opkg needs inserted ahead of `Description`. The gzip header
//! timestamp is fixed so rebuilding an unchanged tree gives identical bytes.

use crate::error::Result;
use crate::hash;
use crate::packages::PackageParser;
use flate2::Compression;
use flate2::GzBuilder;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Index filename opkg fetches
pub const INDEX_FILE: &str = "Packages.gz";

/// One index paragraph for a package file
///
/// `Filename`, `Size`, `MD5Sum` and `SHA256sum` go before the first
/// `Description:` line, or at the end when there is none.
pub fn index_entry(control: &str, filename: &str, content: &[u8]) -> String {
    let fields = format!(
        "Filename: {}\nSize: {}\nMD5Sum: {}\nSHA256sum: {}\n",
        filename,
        content.len(),
        hash::md5(content),
        hash::sha256(content)
    );

    let mut entry = String::with_capacity(control.len() + fields.len());
    let mut inserted = false;
    for line in control.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if !inserted && line.starts_with("Description:") {
            entry.push_str(&fields);
            inserted = true;
        }
        entry.push_str(line);
        entry.push('\n');
    }
    if !inserted {
        entry.push_str(&fields);
    }
    entry
}

/// Gzip index entries, separated by blank lines, with a zero mtime
pub fn encode_index(entries: &[String]) -> Result<Vec<u8>> {
    let mut encoder = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
    encoder.write_all(entries.join("\n").as_bytes())?;
    Ok(encoder.finish()?)
}

/// Build `Packages.gz` for every `.ipk` in `directory`
///
/// Symlinked packages are followed; the index is written even when the
/// directory holds no packages.
pub fn build_directory_index<P: PackageParser + ?Sized>(
    directory: &Path,
    parser: &P,
) -> Result<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "ipk") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut entries = Vec::with_capacity(files.len());
    for path in &files {
        let content = fs::read(path)?;
        let parsed = parser.parse(&content)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        entries.push(index_entry(&parsed.control, &filename, &content));
    }

    let index_path = directory.join(INDEX_FILE);
    fs::write(&index_path, encode_index(&entries)?)?;
    debug!("Indexed {} packages in {}", entries.len(), directory.display());
    Ok(index_path)
}
