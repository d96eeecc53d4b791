// src/tree.rs

//! The release repository
//!
//! One root directory holds everything firmrel manages:
//!
//! ```text
//! <root>/releases/<release>/...
//! <root>/groups/<group>
//! <root>/experiments/<experiment>/...
//! ```
//!
//! Collections are loaded fresh for each command and written back whole.
//! Checks that span collections (experiment packages against release
//! catalogs) live here.

use crate::error::{Error, Result};
use crate::experiments::{ExperimentCatalog, ExperimentPackage};
use crate::filesystem::table::validate_name;
use crate::groups::GroupDirectory;
use crate::packages::{Architecture, FingerprintedPackage, Package, PackageParser};
use crate::release::{BuildTree, Release};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const RELEASES_DIR: &str = "releases";
const GROUPS_DIR: &str = "groups";
const EXPERIMENTS_DIR: &str = "experiments";

/// A release repository rooted at one directory
#[derive(Debug, Clone)]
pub struct ReleaseTree {
    root: PathBuf,
}

impl ReleaseTree {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join(RELEASES_DIR)
    }

    pub fn groups_dir(&self) -> PathBuf {
        self.root.join(GROUPS_DIR)
    }

    pub fn experiments_dir(&self) -> PathBuf {
        self.root.join(EXPERIMENTS_DIR)
    }

    pub fn release_path(&self, name: &str) -> PathBuf {
        self.releases_dir().join(name)
    }

    /// Names of every release directory, sorted
    pub fn release_names(&self) -> Result<Vec<String>> {
        let dir = self.releases_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn open_release(&self, name: &str) -> Result<Release> {
        validate_name(name)?;
        let path = self.release_path(name);
        if !path.is_dir() {
            return Err(Error::NotFound(format!("Release '{}'", name)));
        }
        Release::open(&path)
    }

    pub fn open_releases(&self) -> Result<Vec<Release>> {
        self.release_names()?
            .iter()
            .map(|name| self.open_release(name))
            .collect()
    }

    /// Open one release, or all of them when no name is given
    pub fn select_releases(&self, name: Option<&str>) -> Result<Vec<Release>> {
        match name {
            Some(name) => Ok(vec![self.open_release(name)?]),
            None => self.open_releases(),
        }
    }

    pub fn open_groups(&self) -> Result<GroupDirectory> {
        GroupDirectory::open(self.groups_dir())
    }

    pub fn open_experiments(&self) -> Result<ExperimentCatalog> {
        ExperimentCatalog::open(self.experiments_dir())
    }

    /// Snapshot a build tree as a new release and save it
    pub fn new_release<P: PackageParser + ?Sized>(
        &self,
        name: &str,
        build_root: &Path,
        parser: &P,
    ) -> Result<Release> {
        validate_name(name)?;
        let path = self.release_path(name);
        if path.exists() {
            return Err(Error::AlreadyExists(format!("Release '{}'", name)));
        }
        let build = BuildTree::open(build_root)?;
        let release = Release::create(&path, &build, parser)?;
        release.save()?;
        Ok(release)
    }

    /// Import package files or URLs into a release
    pub fn add_packages<P: PackageParser + ?Sized>(
        &self,
        release: &str,
        locations: &[String],
        parser: &P,
    ) -> Result<Vec<FingerprintedPackage>> {
        let mut catalog = self.open_release(release)?;
        let mut added = Vec::new();
        for location in locations {
            added.push(catalog.add_package_from(location, parser)?);
        }
        catalog.save()?;
        info!("Added {} packages to release {}", added.len(), release);
        Ok(added)
    }

    pub fn add_extra_package(&self, release: &str, package: Package) -> Result<()> {
        let mut catalog = self.open_release(release)?;
        catalog.add_extra_package(package);
        catalog.save()
    }

    pub fn remove_extra_package(&self, release: &str, package: &Package) -> Result<()> {
        let mut catalog = self.open_release(release)?;
        catalog.remove_extra_package(package)?;
        catalog.save()
    }

    /// Pin `name`/`version` for each group or device
    pub fn upgrade_package(
        &self,
        release: &str,
        name: &str,
        version: &str,
        architecture: &Architecture,
        groups: &[String],
    ) -> Result<()> {
        let mut catalog = self.open_release(release)?;
        for group in groups {
            catalog.set_upgrade(group, name, version, architecture)?;
        }
        catalog.save()
    }

    /// Assign a package to an experiment after checking the release has it
    pub fn add_experiment_package(
        &self,
        experiment: &str,
        package: ExperimentPackage,
    ) -> Result<()> {
        let release = self.open_release(&package.release)?;
        if release.locate(&package.package()).is_none() {
            return Err(Error::NotFound(format!(
                "Package {} in release '{}'",
                package.package(),
                package.release
            )));
        }

        let mut catalog = self.open_experiments()?;
        catalog.add_package(experiment, package)?;
        self.save_experiments(&catalog)
    }

    /// Run the cross-release checks, then save the catalog
    pub fn save_experiments(&self, catalog: &ExperimentCatalog) -> Result<()> {
        let releases = self.open_releases()?;
        check_experiment_packages(&releases, catalog)?;
        catalog.save()
    }

    /// Every constraint: each release, the experiment catalog, and the
    /// cross-release experiment checks
    pub fn check_constraints(&self) -> Result<()> {
        let releases = self.open_releases()?;
        let experiments = self.open_experiments()?;
        check_all(&releases, &experiments)
    }
}

/// Whole-tree validation over already loaded collections
pub fn check_all(releases: &[Release], experiments: &ExperimentCatalog) -> Result<()> {
    for release in releases {
        release.check_constraints()?;
    }
    experiments.check_constraints()?;
    check_experiment_packages(releases, experiments)?;
    info!("All constraints hold ({} releases)", releases.len());
    Ok(())
}

/// Experiment packages must exist in their release and must not shadow a
/// builtin or extra package of that release
pub fn check_experiment_packages(
    releases: &[Release],
    experiments: &ExperimentCatalog,
) -> Result<()> {
    debug!("Checking experiment packages against releases");
    for experiment in experiments.iter() {
        for assignment in experiment.packages() {
            let release = releases
                .iter()
                .find(|release| release.name() == assignment.release)
                .ok_or_else(|| {
                    Error::ConstraintViolation(format!(
                        "Experiment '{}' references unknown release '{}'",
                        experiment.name, assignment.release
                    ))
                })?;

            if release.locate(&assignment.package()).is_none() {
                return Err(Error::ConstraintViolation(format!(
                    "Cannot locate package {} of experiment '{}' in release '{}'",
                    assignment.package(),
                    experiment.name,
                    release.name()
                )));
            }

            let collides = release
                .builtin_packages()
                .iter()
                .chain(release.extra_packages())
                .any(|package| {
                    package.name == assignment.name
                        && package.architecture.is_compatible(&assignment.architecture)
                });
            if collides {
                return Err(Error::ConstraintViolation(format!(
                    "Experiment '{}' package {} ({}) is also a builtin or extra package of \
                     release '{}'",
                    experiment.name,
                    assignment.name,
                    assignment.architecture,
                    release.name()
                )));
            }
        }
    }
    Ok(())
}
