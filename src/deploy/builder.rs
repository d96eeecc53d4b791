// src/deploy/builder.rs

//! Deployment tree assembly
//!
//! Stages run strictly in order against one staging root:
//!
//! ```text
//! packages/<release>/<arch>/<name>_<version>_<arch>.ipk     staged blobs
//! <release>/<arch>/<image>                                   firmware images
//! <release>/<arch>/packages/*.ipk                            builtin + extra links
//! <release>/<arch>/updates-device/<device>/*.ipk             resolved pins
//! <release>/<arch>/experiments-device/<device>/*.ipk         experiment packages
//! <release>/<arch>/experiments-device/<device>/Experiments   UCI config
//! */Packages.gz, */Packages.sig, */Upgradable
//! ```
//!
//! Every package file is copied exactly once into `packages/`; all other
//! occurrences are relative symlinks to that copy.

use super::index;
use super::signer::Signer;
use crate::error::{Error, Result};
use crate::experiments::ExperimentCatalog;
use crate::filesystem::StagingTree;
use crate::groups::{DEFAULT_NODE, GroupDirectory};
use crate::packages::{Architecture, Package, PackageParser};
use crate::release::Release;
use crate::resolver::{self, Duplicates};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PACKAGES_DIR: &str = "packages";
const UPDATES_DIR: &str = "updates-device";
const EXPERIMENTS_DIR: &str = "experiments-device";
const EXPERIMENTS_FILE: &str = "Experiments";
const UPGRADABLE_FILE: &str = "Upgradable";

/// Counters for what a build produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub packages_staged: usize,
    pub images_staged: usize,
    pub links_created: usize,
    pub experiment_files: usize,
    pub indices_built: usize,
    pub signatures_created: usize,
    pub devices: usize,
}

/// Builds one deployment tree from loaded collections
pub struct DeploymentBuilder<'a, P: PackageParser + ?Sized> {
    releases: &'a [Release],
    groups: &'a GroupDirectory,
    experiments: &'a ExperimentCatalog,
    parser: &'a P,
    staging: StagingTree,
    stats: BuildStats,
    /// Devices that received anything, per release
    devices: BTreeMap<String, BTreeSet<String>>,
}

impl<'a, P: PackageParser + ?Sized> DeploymentBuilder<'a, P> {
    pub fn new(
        releases: &'a [Release],
        groups: &'a GroupDirectory,
        experiments: &'a ExperimentCatalog,
        parser: &'a P,
        staging_root: &Path,
    ) -> Result<Self> {
        Ok(Self {
            releases,
            groups,
            experiments,
            parser,
            staging: StagingTree::new(staging_root)?,
            stats: BuildStats::default(),
            devices: BTreeMap::new(),
        })
    }

    pub fn staging_root(&self) -> &Path {
        self.staging.root()
    }

    /// Run every staging stage; validation must already have passed
    pub fn build(mut self, signer: Option<&dyn Signer>) -> Result<BuildStats> {
        for release in self.releases {
            info!("Staging release {}", release.name());
            self.stage_packages(release)?;
            self.stage_images(release)?;
            self.link_release_packages(release)?;
            self.link_upgrades(release)?;
            self.link_experiment_packages(release)?;
            self.write_experiment_configuration(release)?;
            self.backfill(release)?;
        }

        let indices = self.build_indices()?;
        self.sign_indices(&indices, signer)?;
        self.mark_upgradable()?;

        self.stats.devices = self.devices.values().flatten().collect::<BTreeSet<_>>().len();
        info!(
            "Staged {} packages, {} links, {} indices in {}",
            self.stats.packages_staged,
            self.stats.links_created,
            self.stats.indices_built,
            self.staging.root().display()
        );
        Ok(self.stats)
    }

    /// Staging path of a package's single copy
    fn staged_package_path(release: &Release, package: &Package) -> PathBuf {
        Path::new(PACKAGES_DIR)
            .join(release.name())
            .join(package.architecture.as_str())
            .join(package.filename())
    }

    fn node_dir(
        release: &Release,
        architecture: &Architecture,
        kind: &str,
        device: &str,
    ) -> PathBuf {
        Path::new(release.name())
            .join(architecture.as_str())
            .join(kind)
            .join(device)
    }

    fn link_package(
        &mut self,
        release: &Release,
        package: &Package,
        link_dir: &Path,
    ) -> Result<()> {
        let target = Self::staged_package_path(release, package);
        self.staging.link_relative(link_dir.join(package.filename()), target)?;
        self.stats.links_created += 1;
        Ok(())
    }

    fn stage_packages(&mut self, release: &Release) -> Result<()> {
        for fingerprinted in release.packages() {
            let source = release.store().path(&fingerprinted.hash);
            let target = Self::staged_package_path(release, &fingerprinted.package());
            self.staging.copy_file(&source, target)?;
            self.stats.packages_staged += 1;
        }
        debug!("Staged {} packages of {}", release.packages().len(), release.name());
        Ok(())
    }

    fn stage_images(&mut self, release: &Release) -> Result<()> {
        for image in release.images() {
            let target = Path::new(release.name())
                .join(image.architecture.as_str())
                .join(&image.name);
            self.staging.copy_file(&release.image_path(image), target)?;
            self.stats.images_staged += 1;
        }
        Ok(())
    }

    fn link_release_packages(&mut self, release: &Release) -> Result<()> {
        for architecture in release.architectures() {
            let dir = Path::new(release.name()).join(architecture.as_str()).join(PACKAGES_DIR);
            self.staging.create_dir(dir)?;
        }

        let packages: Vec<&Package> = release
            .builtin_packages()
            .iter()
            .chain(release.extra_packages())
            .collect();
        for package in packages {
            for architecture in release.expand_architecture(&package.architecture) {
                let link_dir =
                    Path::new(release.name()).join(architecture.as_str()).join(PACKAGES_DIR);
                self.link_package(release, package, &link_dir)?;
            }
        }
        Ok(())
    }

    /// Resolve (token, package) assignments per device and link them
    fn link_resolved(
        &mut self,
        release: &Release,
        assignments: Vec<(String, (String, Architecture), Package)>,
        kind: &str,
    ) -> Result<()> {
        let universe =
            resolver::device_universe(self.groups, assignments.iter().map(|a| a.0.as_str()));
        let resolved = resolver::resolve_assignments(
            self.groups,
            assignments,
            &universe,
            Duplicates::Collapse,
        )?;

        for (device, entries) in &resolved {
            for ((_, architecture), package) in entries {
                let link_dir = Self::node_dir(release, architecture, kind, device);
                self.link_package(release, package, &link_dir)?;
            }
        }

        self.devices
            .entry(release.name().to_string())
            .or_default()
            .extend(universe);
        Ok(())
    }

    fn link_upgrades(&mut self, release: &Release) -> Result<()> {
        let mut assignments = Vec::new();
        for pin in release.upgrades() {
            for architecture in release.expand_architecture(&pin.architecture) {
                assignments.push((
                    pin.group.clone(),
                    (pin.name.clone(), architecture),
                    pin.package(),
                ));
            }
        }
        debug!("Resolving {} upgrade assignments for {}", assignments.len(), release.name());
        self.link_resolved(release, assignments, UPDATES_DIR)
    }

    fn link_experiment_packages(&mut self, release: &Release) -> Result<()> {
        let mut assignments = Vec::new();
        for experiment in self.experiments.iter() {
            for assignment in experiment.packages_for_release(release.name()) {
                for architecture in release.expand_architecture(&assignment.architecture) {
                    assignments.push((
                        assignment.group.clone(),
                        (assignment.name.clone(), architecture),
                        assignment.package(),
                    ));
                }
            }
        }
        debug!("Resolving {} experiment assignments for {}", assignments.len(), release.name());
        self.link_resolved(release, assignments, EXPERIMENTS_DIR)
    }

    fn write_experiment_configuration(&mut self, release: &Release) -> Result<()> {
        let mut header_assignments = Vec::new();
        let mut body_assignments = Vec::new();
        for experiment in self.experiments.iter() {
            for group in experiment.header_groups() {
                let header = experiment.header(&group);
                header_assignments.push((group, experiment.name.clone(), header));
            }
            for assignment in experiment.packages_for_release(release.name()) {
                for architecture in release.expand_architecture(&assignment.architecture) {
                    body_assignments.push((
                        assignment.group.clone(),
                        (architecture, experiment.name.clone(), assignment.name.clone()),
                        assignment.package(),
                    ));
                }
            }
        }

        let tokens: Vec<&str> = header_assignments
            .iter()
            .map(|a| a.0.as_str())
            .chain(body_assignments.iter().map(|a| a.0.as_str()))
            .collect();
        let universe = resolver::device_universe(self.groups, tokens);

        let headers = resolver::resolve_assignments(
            self.groups,
            header_assignments,
            &universe,
            Duplicates::Reject,
        )?;
        let bodies = resolver::resolve_assignments(
            self.groups,
            body_assignments,
            &universe,
            Duplicates::Reject,
        )?;

        // (architecture, device) -> experiment -> block text
        let mut configurations: BTreeMap<(Architecture, String), BTreeMap<String, String>> =
            BTreeMap::new();
        for (device, entries) in &bodies {
            for (architecture, experiment, name) in entries.keys() {
                let blocks = configurations
                    .entry((architecture.clone(), device.clone()))
                    .or_default();
                let block = match blocks.entry(experiment.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let header = match headers.get(device).and_then(|h| h.get(experiment)) {
                            Some(header) => header.clone(),
                            None => self.experiments.get(experiment)?.header(DEFAULT_NODE),
                        };
                        entry.insert(header)
                    }
                };
                block.push_str(&format!("    list 'package' '{}'\n", name));
            }
        }

        for ((architecture, device), blocks) in configurations {
            let mut content = String::new();
            for block in blocks.values() {
                content.push_str(block);
                content.push('\n');
            }
            let path = Self::node_dir(release, &architecture, EXPERIMENTS_DIR, &device)
                .join(EXPERIMENTS_FILE);
            self.staging.write_file(path, content.as_bytes())?;
            self.stats.experiment_files += 1;
        }

        self.devices
            .entry(release.name().to_string())
            .or_default()
            .extend(universe);
        Ok(())
    }

    /// Give every known device the per-node directories and an
    /// `Experiments` file, even when nothing was assigned to it
    fn backfill(&mut self, release: &Release) -> Result<()> {
        let mut devices = self.groups.all_devices();
        if let Some(seen) = self.devices.get(release.name()) {
            devices.extend(seen.iter().cloned());
        }

        for architecture in release.architectures() {
            for device in &devices {
                self.staging
                    .create_dir(Self::node_dir(release, architecture, UPDATES_DIR, device))?;
                let experiments_dir = self
                    .staging
                    .create_dir(Self::node_dir(release, architecture, EXPERIMENTS_DIR, device))?;
                let experiments_file = experiments_dir.join(EXPERIMENTS_FILE);
                if !experiments_file.exists() {
                    fs::write(&experiments_file, b"")?;
                }
            }
        }

        debug!("Backfilled {} devices for {}", devices.len(), release.name());
        self.devices
            .entry(release.name().to_string())
            .or_default()
            .extend(devices);
        Ok(())
    }

    /// Staged directories matching `<release>/<arch>/<pattern>`
    fn staged_dirs(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let full = format!(
            "{}/*/*/{}",
            glob::Pattern::escape(&self.staging.root().to_string_lossy()),
            pattern
        );
        let mut dirs = Vec::new();
        let paths = glob::glob(&full)
            .map_err(|e| Error::ParseError(format!("Invalid glob pattern {}: {}", full, e)))?;
        for path in paths {
            match path {
                Ok(path) if path.is_dir() => dirs.push(path),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable path: {}", e),
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn build_indices(&mut self) -> Result<Vec<PathBuf>> {
        let mut indices = Vec::new();
        let patterns = [
            PACKAGES_DIR.to_string(),
            format!("{}/*", UPDATES_DIR),
            format!("{}/*", EXPERIMENTS_DIR),
        ];
        for pattern in patterns {
            for dir in self.staged_dirs(&pattern)? {
                indices.push(index::build_directory_index(&dir, self.parser)?);
                self.stats.indices_built += 1;
            }
        }
        info!("Built {} package indices", indices.len());
        Ok(indices)
    }

    fn sign_indices(&mut self, indices: &[PathBuf], signer: Option<&dyn Signer>) -> Result<()> {
        let Some(signer) = signer else {
            warn!("No signing key configured; package indices are unsigned");
            return Ok(());
        };
        for index in indices {
            signer.sign(index)?;
            self.stats.signatures_created += 1;
        }
        info!("Signed {} package indices", self.stats.signatures_created);
        Ok(())
    }

    fn mark_upgradable(&mut self) -> Result<()> {
        for pattern in [format!("{}/*", UPDATES_DIR), format!("{}/*", EXPERIMENTS_DIR)] {
            for dir in self.staged_dirs(&pattern)? {
                fs::write(dir.join(UPGRADABLE_FILE), b"")?;
            }
        }
        Ok(())
    }
}
