// src/experiments.rs

//! Experiments: optional feature bundles
//!
//! An experiment assigns extra packages to groups within releases, carries
//! three per-group flags (required, revoked, installed by default) and may
//! name other experiments it conflicts with. Each experiment is a directory:
//!
//! ```text
//! experiments/<name>/description
//! experiments/<name>/display-name
//! experiments/<name>/conflicts
//! experiments/<name>/packages
//! experiments/<name>/installed-by-default
//! experiments/<name>/required
//! experiments/<name>/revoked
//! ```

use crate::error::{Error, Result};
use crate::filesystem::table::{self, Record, validate_name};
use crate::groups::DEFAULT_NODE;
use crate::packages::{Architecture, Package};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DESCRIPTION_FILE: &str = "description";
const DISPLAY_NAME_FILE: &str = "display-name";
const CONFLICTS_FILE: &str = "conflicts";
const PACKAGES_FILE: &str = "packages";
const INSTALLED_BY_DEFAULT_FILE: &str = "installed-by-default";
const REQUIRED_FILE: &str = "required";
const REVOKED_FILE: &str = "revoked";

/// A package assigned to a group within one release
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExperimentPackage {
    pub group: String,
    pub release: String,
    pub name: String,
    pub version: String,
    pub architecture: Architecture,
}

impl ExperimentPackage {
    pub fn new(
        group: impl Into<String>,
        release: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<Architecture>,
    ) -> Self {
        Self {
            group: group.into(),
            release: release.into(),
            name: name.into(),
            version: version.into(),
            architecture: architecture.into(),
        }
    }

    pub fn package(&self) -> Package {
        Package {
            name: self.name.clone(),
            version: self.version.clone(),
            architecture: self.architecture.clone(),
        }
    }
}

impl Record for ExperimentPackage {
    const FIELDS: &'static [&'static str] =
        &["group", "release", "name", "version", "architecture"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.group.clone(),
            self.release.clone(),
            self.name.clone(),
            self.version.clone(),
            self.architecture.to_string(),
        ]
    }

    fn from_fields(fields: &[&str]) -> Result<Self> {
        Ok(Self::new(fields[0], fields[1], fields[2], fields[3], fields[4]))
    }
}

/// Row of a flag table (one group per line)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupName(String);

impl Record for GroupName {
    const FIELDS: &'static [&'static str] = &["group"];

    fn to_fields(&self) -> Vec<String> {
        vec![self.0.clone()]
    }

    fn from_fields(fields: &[&str]) -> Result<Self> {
        Ok(Self(fields[0].to_string()))
    }
}

/// Row of the conflicts table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ConflictName(String);

impl Record for ConflictName {
    const FIELDS: &'static [&'static str] = &["name"];

    fn to_fields(&self) -> Vec<String> {
        vec![self.0.clone()]
    }

    fn from_fields(fields: &[&str]) -> Result<Self> {
        Ok(Self(fields[0].to_string()))
    }
}

fn read_column<R: Record, F: Fn(R) -> String>(path: &Path, unwrap: F) -> Result<BTreeSet<String>> {
    Ok(table::read_records::<R>(path)?.into_iter().map(unwrap).collect())
}

/// Per-group experiment flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Required,
    Revoked,
    InstalledByDefault,
}

/// One optional feature bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experiment {
    pub name: String,
    pub display_name: String,
    pub description: String,
    conflicts: BTreeSet<String>,
    packages: BTreeSet<ExperimentPackage>,
    installed_by_default: BTreeSet<String>,
    required: BTreeSet<String>,
    revoked: BTreeSet<String>,
}

impl Experiment {
    pub fn new(name: &str, display_name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
            conflicts: BTreeSet::new(),
            packages: BTreeSet::new(),
            installed_by_default: BTreeSet::new(),
            required: BTreeSet::new(),
            revoked: BTreeSet::new(),
        }
    }

    fn open(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                Error::ParseError(format!("{} has no experiment name", path.display()))
            })?;

        let read_text = |file: &str| -> Result<String> {
            let full = path.join(file);
            if full.exists() {
                Ok(fs::read_to_string(full)?)
            } else {
                Ok(String::new())
            }
        };

        Ok(Self {
            display_name: read_text(DISPLAY_NAME_FILE)?,
            description: read_text(DESCRIPTION_FILE)?,
            conflicts: read_column::<ConflictName, _>(&path.join(CONFLICTS_FILE), |c| c.0)?,
            packages: table::read_records(&path.join(PACKAGES_FILE))?,
            installed_by_default: read_column::<GroupName, _>(
                &path.join(INSTALLED_BY_DEFAULT_FILE),
                |g| g.0,
            )?,
            required: read_column::<GroupName, _>(&path.join(REQUIRED_FILE), |g| g.0)?,
            revoked: read_column::<GroupName, _>(&path.join(REVOKED_FILE), |g| g.0)?,
            name,
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        fs::write(path.join(DESCRIPTION_FILE), &self.description)?;
        fs::write(path.join(DISPLAY_NAME_FILE), &self.display_name)?;

        let conflicts: BTreeSet<ConflictName> =
            self.conflicts.iter().cloned().map(ConflictName).collect();
        table::write_records(&path.join(CONFLICTS_FILE), &conflicts)?;
        table::write_records(&path.join(PACKAGES_FILE), &self.packages)?;

        for (file, groups) in [
            (INSTALLED_BY_DEFAULT_FILE, &self.installed_by_default),
            (REQUIRED_FILE, &self.required),
            (REVOKED_FILE, &self.revoked),
        ] {
            let rows: BTreeSet<GroupName> = groups.iter().cloned().map(GroupName).collect();
            table::write_records(&path.join(file), &rows)?;
        }
        Ok(())
    }

    pub fn conflicts(&self) -> &BTreeSet<String> {
        &self.conflicts
    }

    pub fn packages(&self) -> &BTreeSet<ExperimentPackage> {
        &self.packages
    }

    /// Assignments belonging to one release
    pub fn packages_for_release<'a>(
        &'a self,
        release: &'a str,
    ) -> impl Iterator<Item = &'a ExperimentPackage> + 'a {
        self.packages.iter().filter(move |package| package.release == release)
    }

    fn flag_set(&self, flag: Flag) -> &BTreeSet<String> {
        match flag {
            Flag::Required => &self.required,
            Flag::Revoked => &self.revoked,
            Flag::InstalledByDefault => &self.installed_by_default,
        }
    }

    fn flag_set_mut(&mut self, flag: Flag) -> &mut BTreeSet<String> {
        match flag {
            Flag::Required => &mut self.required,
            Flag::Revoked => &mut self.revoked,
            Flag::InstalledByDefault => &mut self.installed_by_default,
        }
    }

    /// Groups for which the flag is set
    pub fn flag_groups(&self, flag: Flag) -> &BTreeSet<String> {
        self.flag_set(flag)
    }

    pub fn has_flag(&self, flag: Flag, group: &str) -> bool {
        self.flag_set(flag).contains(group)
    }

    pub fn is_required(&self, group: &str) -> bool {
        self.has_flag(Flag::Required, group)
    }

    pub fn is_revoked(&self, group: &str) -> bool {
        self.has_flag(Flag::Revoked, group)
    }

    pub fn is_installed_by_default(&self, group: &str) -> bool {
        self.has_flag(Flag::InstalledByDefault, group)
    }

    /// Whether the experiment is required for at least one group
    pub fn is_required_anywhere(&self) -> bool {
        !self.required.is_empty()
    }

    /// Groups that get their own configuration header: every flagged group
    /// plus `default`
    pub fn header_groups(&self) -> BTreeSet<String> {
        let mut groups: BTreeSet<String> = self
            .installed_by_default
            .iter()
            .chain(&self.required)
            .chain(&self.revoked)
            .cloned()
            .collect();
        groups.insert(DEFAULT_NODE.to_string());
        groups
    }

    /// UCI configuration block header as seen by `group`
    pub fn header(&self, group: &str) -> String {
        let flag = |set: bool| if set { "1" } else { "0" };

        let mut header = format!("config 'experiment' '{}'\n", self.name);
        header.push_str(&format!("    option 'display_name' '{}'\n", self.display_name));
        header.push_str(&format!("    option 'description' '{}'\n", self.description));
        for conflict in &self.conflicts {
            header.push_str(&format!("    list 'conflicts' '{}'\n", conflict));
        }
        header.push_str(&format!("    option 'required' '{}'\n", flag(self.is_required(group))));
        header.push_str(&format!("    option 'revoked' '{}'\n", flag(self.is_revoked(group))));
        header.push_str(&format!(
            "    option 'installed' '{}'\n",
            flag(self.is_installed_by_default(group))
        ));
        header
    }
}

/// Every experiment under one directory
#[derive(Debug, Clone)]
pub struct ExperimentCatalog {
    root: PathBuf,
    experiments: BTreeMap<String, Experiment>,
}

impl ExperimentCatalog {
    /// Load every experiment directory under `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut experiments = BTreeMap::new();

        if root.is_dir() {
            for entry in fs::read_dir(&root)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let experiment = Experiment::open(&entry.path())?;
                experiments.insert(experiment.name.clone(), experiment);
            }
        }

        debug!("Loaded {} experiments from {}", experiments.len(), root.display());
        Ok(Self { root, experiments })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn names(&self) -> Vec<String> {
        self.experiments.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.values()
    }

    pub fn get(&self, name: &str) -> Result<&Experiment> {
        self.experiments
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Experiment '{}'", name)))
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Experiment> {
        self.experiments
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("Experiment '{}'", name)))
    }

    pub fn new_experiment(
        &mut self,
        name: &str,
        display_name: &str,
        description: &str,
    ) -> Result<()> {
        validate_name(name)?;
        if self.experiments.contains_key(name) {
            return Err(Error::AlreadyExists(format!("Experiment '{}'", name)));
        }
        self.experiments
            .insert(name.to_string(), Experiment::new(name, display_name, description));
        info!("Created experiment {}", name);
        Ok(())
    }

    pub fn add_package(&mut self, experiment: &str, package: ExperimentPackage) -> Result<()> {
        validate_name(&package.group)?;
        let experiment = self.get_mut(experiment)?;
        debug!("Adding {} to experiment {}", package.package(), experiment.name);
        experiment.packages.insert(package);
        Ok(())
    }

    pub fn remove_package(&mut self, experiment: &str, package: &ExperimentPackage) -> Result<()> {
        let experiment = self.get_mut(experiment)?;
        if !experiment.packages.remove(package) {
            return Err(Error::NotFound(format!(
                "Package {} for {} in experiment '{}'",
                package.package(),
                package.group,
                experiment.name
            )));
        }
        Ok(())
    }

    pub fn add_conflict(&mut self, experiment: &str, other: &str) -> Result<()> {
        table::validate_field(other)?;
        let experiment = self.get_mut(experiment)?;
        experiment.conflicts.insert(other.to_string());
        Ok(())
    }

    pub fn remove_conflict(&mut self, experiment: &str, other: &str) -> Result<()> {
        let experiment = self.get_mut(experiment)?;
        if !experiment.conflicts.remove(other) {
            return Err(Error::NotFound(format!(
                "Conflict '{}' in experiment '{}'",
                other, experiment.name
            )));
        }
        Ok(())
    }

    /// Set or clear a per-group flag
    pub fn set_flag(
        &mut self,
        experiment: &str,
        flag: Flag,
        group: &str,
        value: bool,
    ) -> Result<()> {
        validate_name(group)?;
        let experiment = self.get_mut(experiment)?;
        let groups = experiment.flag_set_mut(flag);
        if value {
            groups.insert(group.to_string());
        } else {
            groups.remove(group);
        }
        debug!("Set {:?}={} for {} in {}", flag, value, group, experiment.name);
        Ok(())
    }

    /// Experiments that name `name` as a conflict
    pub fn implicit_conflicts(&self, name: &str) -> Vec<String> {
        self.experiments
            .values()
            .filter(|experiment| experiment.name != name && experiment.conflicts.contains(name))
            .map(|experiment| experiment.name.clone())
            .collect()
    }

    /// No required experiment may be named as a conflict by another required one
    pub fn check_constraints(&self) -> Result<()> {
        debug!("Checking whether required experiments conflict");
        let required: Vec<&Experiment> = self
            .experiments
            .values()
            .filter(|experiment| experiment.is_required_anywhere())
            .collect();

        let must_be_installed: BTreeSet<&str> = required.iter().map(|e| e.name.as_str()).collect();
        for experiment in &required {
            for conflict in &experiment.conflicts {
                if must_be_installed.contains(conflict.as_str()) {
                    return Err(Error::ConstraintViolation(format!(
                        "Required experiments conflict: {} conflicts with {}",
                        experiment.name, conflict
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check constraints, then write every experiment
    pub fn save(&self) -> Result<()> {
        self.check_constraints()?;
        for experiment in self.experiments.values() {
            experiment.save(&self.root.join(&experiment.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> (TempDir, ExperimentCatalog) {
        let temp_dir = TempDir::new().unwrap();
        let catalog = ExperimentCatalog::open(temp_dir.path().join("experiments")).unwrap();
        (temp_dir, catalog)
    }

    #[test]
    fn test_round_trip() {
        let (temp, mut catalog) = catalog();
        catalog.new_experiment("exp1", "Experiment One", "Measures things").unwrap();
        catalog
            .add_package("exp1", ExperimentPackage::new("g1", "r1", "tool", "1.0", "all"))
            .unwrap();
        catalog.add_conflict("exp1", "exp2").unwrap();
        catalog.set_flag("exp1", Flag::Required, "g1", true).unwrap();
        catalog.set_flag("exp1", Flag::InstalledByDefault, "default", true).unwrap();
        catalog.save().unwrap();

        let reopened = ExperimentCatalog::open(temp.path().join("experiments")).unwrap();
        assert_eq!(reopened.get("exp1").unwrap(), catalog.get("exp1").unwrap());
    }

    #[test]
    fn test_duplicates_and_missing() {
        let (_temp, mut catalog) = catalog();
        catalog.new_experiment("exp1", "E", "d").unwrap();
        assert!(matches!(catalog.new_experiment("exp1", "E", "d"), Err(Error::AlreadyExists(_))));
        assert!(matches!(catalog.get("nope"), Err(Error::NotFound(_))));
        assert!(matches!(catalog.remove_conflict("exp1", "x"), Err(Error::NotFound(_))));
        let package = ExperimentPackage::new("g1", "r1", "tool", "1.0", "x");
        assert!(matches!(catalog.remove_package("exp1", &package), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_required_conflict_rejected() {
        let (_temp, mut catalog) = catalog();
        catalog.new_experiment("a", "A", "a").unwrap();
        catalog.new_experiment("b", "B", "b").unwrap();
        catalog.add_conflict("a", "b").unwrap();
        catalog.set_flag("a", Flag::Required, "g1", true).unwrap();
        catalog.check_constraints().unwrap();

        catalog.set_flag("b", Flag::Required, "g2", true).unwrap();
        assert!(matches!(catalog.save(), Err(Error::ConstraintViolation(_))));
        assert!(!catalog.root().join("a").exists());
    }

    #[test]
    fn test_tokens_must_be_file_names() {
        let (_temp, mut catalog) = catalog();
        catalog.new_experiment("exp1", "Experiment One", "").unwrap();

        let nested = ExperimentPackage::new("lab/n1", "r1", "tool", "1.0", "all");
        assert!(matches!(catalog.add_package("exp1", nested), Err(Error::ParseError(_))));
        assert!(matches!(
            catalog.set_flag("exp1", Flag::Revoked, "..", true),
            Err(Error::ParseError(_))
        ));
        assert!(catalog.get("exp1").unwrap().packages().is_empty());
        assert!(!catalog.get("exp1").unwrap().is_revoked(".."));
    }

    #[test]
    fn test_implicit_conflicts() {
        let (_temp, mut catalog) = catalog();
        for name in ["a", "b", "c"] {
            catalog.new_experiment(name, name, name).unwrap();
        }
        catalog.add_conflict("b", "a").unwrap();
        catalog.add_conflict("c", "a").unwrap();
        assert_eq!(catalog.implicit_conflicts("a"), vec!["b", "c"]);
        assert!(catalog.implicit_conflicts("b").is_empty());
    }

    #[test]
    fn test_header() {
        let mut experiment = Experiment::new("exp1", "Experiment One", "Measures things");
        experiment.conflicts.insert("exp2".to_string());
        experiment.required.insert("g1".to_string());

        assert_eq!(
            experiment.header("g1"),
            "config 'experiment' 'exp1'\n\
             \x20   option 'display_name' 'Experiment One'\n\
             \x20   option 'description' 'Measures things'\n\
             \x20   list 'conflicts' 'exp2'\n\
             \x20   option 'required' '1'\n\
             \x20   option 'revoked' '0'\n\
             \x20   option 'installed' '0'\n"
        );
        assert!(experiment.header("default").contains("option 'required' '0'"));
        assert_eq!(
            experiment.header_groups().into_iter().collect::<Vec<_>>(),
            vec!["default", "g1"]
        );
    }
}
