// src/release/constraints.rs

//! Referential-integrity checks for one release
//!
//! Run before every save and every deployment. The first failing check
//! aborts with `ConstraintViolation`, or `IntegrityError` when stored
//! content no longer matches its fingerprint.

use super::Release;
use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use crate::packages::{Architecture, Package};
use std::collections::BTreeSet;
use tracing::debug;

impl Release {
    /// Run every single-release check
    pub fn check_constraints(&self) -> Result<()> {
        debug!("Checking constraints of release {}", self.name);
        self.check_builtin_packages_located()?;
        self.check_builtin_packages_unique()?;
        self.check_extra_packages_located()?;
        self.check_builtin_extra_disjoint()?;
        self.check_package_blobs_exist()?;
        self.check_package_fingerprints_valid()?;
        self.check_image_fingerprints_valid()?;
        self.check_package_fingerprints_unique()?;
        self.check_upgrades_located()?;
        self.check_upgrades_target_builtins()?;
        self.check_upgrades_unique()?;
        Ok(())
    }

    fn fingerprinted_identities(&self) -> BTreeSet<Package> {
        self.fingerprinted_packages.iter().map(|fp| fp.package()).collect()
    }

    fn check_builtin_packages_located(&self) -> Result<()> {
        let located = self.fingerprinted_identities();
        for package in &self.builtin_packages {
            if !located.contains(package) {
                return Err(Error::ConstraintViolation(format!(
                    "Cannot locate builtin package {} in release {}",
                    package, self.name
                )));
            }
        }
        Ok(())
    }

    fn check_builtin_packages_unique(&self) -> Result<()> {
        let mut keys: BTreeSet<(&str, &Architecture)> = BTreeSet::new();
        for package in &self.builtin_packages {
            if !keys.insert((package.name.as_str(), &package.architecture)) {
                return Err(Error::ConstraintViolation(format!(
                    "Builtin package {} ({}) has multiple versions in release {}",
                    package.name, package.architecture, self.name
                )));
            }
        }
        Ok(())
    }

    fn check_extra_packages_located(&self) -> Result<()> {
        let located = self.fingerprinted_identities();
        for package in &self.extra_packages {
            if !located.contains(package) {
                return Err(Error::ConstraintViolation(format!(
                    "Cannot locate extra package {} in release {}",
                    package, self.name
                )));
            }
        }
        Ok(())
    }

    fn check_builtin_extra_disjoint(&self) -> Result<()> {
        if let Some(package) = self.extra_packages.intersection(&self.builtin_packages).next() {
            return Err(Error::ConstraintViolation(format!(
                "Package {} is both builtin and extra in release {}",
                package, self.name
            )));
        }
        Ok(())
    }

    fn check_package_blobs_exist(&self) -> Result<()> {
        for fingerprinted in &self.fingerprinted_packages {
            if !self.store.contains(&fingerprinted.hash) {
                return Err(Error::ConstraintViolation(format!(
                    "Cannot find package {} at {}",
                    fingerprinted.package(),
                    self.store.path(&fingerprinted.hash).display()
                )));
            }
        }
        Ok(())
    }

    fn check_package_fingerprints_valid(&self) -> Result<()> {
        self.store.verify_all()
    }

    fn check_image_fingerprints_valid(&self) -> Result<()> {
        for image in &self.fingerprinted_images {
            let path = self.image_path(image);
            if !path.is_file() {
                return Err(Error::ConstraintViolation(format!(
                    "Cannot find image {} at {}",
                    image.name,
                    path.display()
                )));
            }
            hash::verify_file(&path, &image.hash, HashAlgorithm::Sha256)?;
        }
        Ok(())
    }

    fn check_package_fingerprints_unique(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for fingerprinted in &self.fingerprinted_packages {
            let package = fingerprinted.package();
            if !seen.insert(package.clone()) {
                return Err(Error::ConstraintViolation(format!(
                    "Multiple fingerprints for package {} in release {}",
                    package, self.name
                )));
            }
        }
        Ok(())
    }

    fn check_upgrades_located(&self) -> Result<()> {
        let located = self.fingerprinted_identities();
        for pin in &self.package_upgrades {
            if !located.contains(&pin.package()) {
                return Err(Error::ConstraintViolation(format!(
                    "Cannot locate upgraded package {} for {} in release {}",
                    pin.package(),
                    pin.group,
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn check_upgrades_target_builtins(&self) -> Result<()> {
        let builtin_keys: BTreeSet<(&str, &Architecture)> = self
            .builtin_packages
            .iter()
            .map(|package| (package.name.as_str(), &package.architecture))
            .collect();
        for pin in &self.package_upgrades {
            if !builtin_keys.contains(&(pin.name.as_str(), &pin.architecture)) {
                return Err(Error::ConstraintViolation(format!(
                    "Upgrade of {} ({}) for {} is not for a builtin package",
                    pin.name, pin.architecture, pin.group
                )));
            }
        }
        Ok(())
    }

    fn check_upgrades_unique(&self) -> Result<()> {
        let mut keys: BTreeSet<(&str, &str, &Architecture)> = BTreeSet::new();
        for pin in &self.package_upgrades {
            if !keys.insert((pin.group.as_str(), pin.name.as_str(), &pin.architecture)) {
                return Err(Error::ConstraintViolation(format!(
                    "Multiple upgrades of {} ({}) for {}",
                    pin.name, pin.architecture, pin.group
                )));
            }
        }
        Ok(())
    }
}
