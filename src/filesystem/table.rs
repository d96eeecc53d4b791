// src/filesystem/table.rs

//! Space-delimited record tables
//!
//! Every persisted set in a release or experiment is a small text table:
//! a header row naming the columns, then one record per line, fields
//! separated by a single space, records sorted. A missing file reads as an
//! empty set so new collections need no bootstrap step.
//!
//! ```text
//! name version architecture
//! base-files 1.0 ar71xx
//! busybox 1.19 ar71xx
//! ```

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// A value that persists as one row of a record table
pub trait Record: Sized + Ord {
    /// Column names, written as the header row
    const FIELDS: &'static [&'static str];

    /// Field values in column order
    fn to_fields(&self) -> Vec<String>;

    /// Build a record from one row's fields (already split and counted)
    fn from_fields(fields: &[&str]) -> Result<Self>;
}

/// Read a record table; a missing file is an empty set
pub fn read_records<R: Record>(path: &Path) -> Result<BTreeSet<R>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }

    let content = fs::read_to_string(path)?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let header: Vec<&str> = match lines.next() {
        Some(line) => line.split(' ').collect(),
        None => return Ok(BTreeSet::new()),
    };
    if header != R::FIELDS {
        return Err(Error::ParseError(format!(
            "{}: expected header '{}', found '{}'",
            path.display(),
            R::FIELDS.join(" "),
            header.join(" ")
        )));
    }

    let mut records = BTreeSet::new();
    for (index, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() != R::FIELDS.len() {
            return Err(Error::ParseError(format!(
                "{} line {}: expected {} fields, found {}",
                path.display(),
                index + 2,
                R::FIELDS.len(),
                fields.len()
            )));
        }
        records.insert(R::from_fields(&fields)?);
    }

    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Write a record table, header first, records in sorted order
///
/// Fields that are empty or contain whitespace cannot round-trip and are
/// rejected before anything is written.
pub fn write_records<R: Record>(path: &Path, records: &BTreeSet<R>) -> Result<()> {
    let mut content = R::FIELDS.join(" ");
    content.push('\n');

    for record in records {
        let fields = record.to_fields();
        for field in &fields {
            validate_field(field)?;
        }
        content.push_str(&fields.join(" "));
        content.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read a one-value-per-line list; a missing file is an empty set
pub fn read_lines(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Write a one-value-per-line list, sorted
pub fn write_lines(path: &Path, values: &BTreeSet<String>) -> Result<()> {
    let mut content = String::new();
    for value in values {
        validate_field(value)?;
        content.push_str(value);
        content.push('\n');
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Reject values that would break the space-delimited format
pub fn validate_field(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::ParseError("empty field value".to_string()));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(Error::ParseError(format!(
            "field value '{}' contains whitespace",
            value
        )));
    }
    Ok(())
}

/// Validate a name that also becomes a file or directory name
pub fn validate_name(name: &str) -> Result<()> {
    validate_field(name)?;
    if name.contains('/') || name.starts_with('.') {
        return Err(Error::ParseError(format!(
            "'{}' is not usable as a file name",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
    struct Pair {
        left: String,
        right: String,
    }

    impl Record for Pair {
        const FIELDS: &'static [&'static str] = &["left", "right"];

        fn to_fields(&self) -> Vec<String> {
            vec![self.left.clone(), self.right.clone()]
        }

        fn from_fields(fields: &[&str]) -> Result<Self> {
            Ok(Self {
                left: fields[0].to_string(),
                right: fields[1].to_string(),
            })
        }
    }

    fn pair(left: &str, right: &str) -> Pair {
        Pair {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let records: BTreeSet<Pair> = read_records(&temp_dir.path().join("nope")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_written_sorted_with_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pairs");
        let records: BTreeSet<Pair> = [pair("b", "2"), pair("a", "1")].into_iter().collect();

        write_records(&path, &records).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "left right\na 1\nb 2\n");
        assert_eq!(read_records::<Pair>(&path).unwrap(), records);
    }

    #[test]
    fn test_bad_header_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pairs");
        fs::write(&path, "one two\na 1\n").unwrap();
        assert!(matches!(read_records::<Pair>(&path), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pairs");
        fs::write(&path, "left right\na 1 extra\n").unwrap();
        assert!(matches!(read_records::<Pair>(&path), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_whitespace_field_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pairs");
        let records: BTreeSet<Pair> = [pair("a b", "1")].into_iter().collect();
        assert!(write_records(&path, &records).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("office-aps").is_ok());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("two words").is_err());
    }

    #[test]
    fn test_lines_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("group");
        let values: BTreeSet<String> = ["n2", "n1"].iter().map(|s| s.to_string()).collect();

        write_lines(&path, &values).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "n1\nn2\n");
        assert_eq!(read_lines(&path).unwrap(), values);
    }
}
