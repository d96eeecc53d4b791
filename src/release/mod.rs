// src/release/mod.rs

//! Per-release package catalog
//!
//! A release directory holds independent record tables plus the content
//! store and image copies:
//!
//! ```text
//! releases/<name>/architectures
//! releases/<name>/builtin-packages
//! releases/<name>/extra-packages
//! releases/<name>/fingerprinted-packages
//! releases/<name>/fingerprinted-images
//! releases/<name>/package-upgrades
//! releases/<name>/packages/<sha256>.ipk
//! releases/<name>/images/<file>
//! ```
//!
//! Releases are snapshotted once from a build tree and afterwards only grow.
//! Every [`Release::save`] runs the constraint checks first and writes
//! nothing if any fails.

mod build_tree;
mod constraints;

pub use build_tree::BuildTree;

use crate::error::{Error, Result};
use crate::filesystem::table::{self, Record};
use crate::filesystem::ContentStore;
use crate::hash;
use crate::packages::{
    Architecture, FingerprintedPackage, Package, PackageFetcher, PackageParser, fetch,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ARCHITECTURES_FILE: &str = "architectures";
const BUILTIN_PACKAGES_FILE: &str = "builtin-packages";
const EXTRA_PACKAGES_FILE: &str = "extra-packages";
const FINGERPRINTED_PACKAGES_FILE: &str = "fingerprinted-packages";
const FINGERPRINTED_IMAGES_FILE: &str = "fingerprinted-images";
const PACKAGE_UPGRADES_FILE: &str = "package-upgrades";
const PACKAGES_DIR: &str = "packages";
const IMAGES_DIR: &str = "images";

/// A firmware image copied into the release
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FingerprintedImage {
    pub name: String,
    pub architecture: Architecture,
    pub hash: String,
}

impl Record for FingerprintedImage {
    const FIELDS: &'static [&'static str] = &["name", "architecture", "hash"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.architecture.to_string(),
            self.hash.clone(),
        ]
    }

    fn from_fields(fields: &[&str]) -> Result<Self> {
        Ok(Self {
            name: fields[0].to_string(),
            architecture: Architecture::from(fields[1]),
            hash: fields[2].to_string(),
        })
    }
}

/// A version pinned for a group, device or `default`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpgradePin {
    pub group: String,
    pub name: String,
    pub version: String,
    pub architecture: Architecture,
}

impl UpgradePin {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        architecture: impl Into<Architecture>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            architecture: architecture.into(),
        }
    }

    /// The package the pin installs
    pub fn package(&self) -> Package {
        Package {
            name: self.name.clone(),
            version: self.version.clone(),
            architecture: self.architecture.clone(),
        }
    }
}

impl Record for UpgradePin {
    const FIELDS: &'static [&'static str] = &["group", "name", "version", "architecture"];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.group.clone(),
            self.name.clone(),
            self.version.clone(),
            self.architecture.to_string(),
        ]
    }

    fn from_fields(fields: &[&str]) -> Result<Self> {
        Ok(Self::new(fields[0], fields[1], fields[2], fields[3]))
    }
}

/// One release's catalog
#[derive(Debug, Clone)]
pub struct Release {
    name: String,
    path: PathBuf,
    store: ContentStore,
    architectures: BTreeSet<Architecture>,
    builtin_packages: BTreeSet<Package>,
    extra_packages: BTreeSet<Package>,
    fingerprinted_packages: BTreeSet<FingerprintedPackage>,
    fingerprinted_images: BTreeSet<FingerprintedImage>,
    package_upgrades: BTreeSet<UpgradePin>,
}

impl Release {
    fn empty(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| Error::ParseError(format!("{} has no release name", path.display())))?;
        table::validate_name(&name)?;

        Ok(Self {
            name,
            path: path.to_path_buf(),
            store: ContentStore::new(path.join(PACKAGES_DIR)),
            architectures: BTreeSet::new(),
            builtin_packages: BTreeSet::new(),
            extra_packages: BTreeSet::new(),
            fingerprinted_packages: BTreeSet::new(),
            fingerprinted_images: BTreeSet::new(),
            package_upgrades: BTreeSet::new(),
        })
    }

    /// Snapshot a new release from a build tree
    ///
    /// Every package in the build's package directories is stored and
    /// fingerprinted. Installed packages become builtins; all others become
    /// extras. Images are copied and fingerprinted. Nothing is persisted
    /// until [`save`](Self::save).
    pub fn create<P: PackageParser + ?Sized>(
        path: &Path,
        build: &BuildTree,
        parser: &P,
    ) -> Result<Self> {
        if path.exists() {
            return Err(Error::AlreadyExists(format!("Release at {}", path.display())));
        }
        info!("Creating new release in {}", path.display());

        let mut release = Self::empty(path)?;
        release.architectures = build
            .architectures()?
            .into_iter()
            .map(Architecture::from)
            .collect();

        for file in build.package_files()? {
            release.add_package_file(&file, parser)?;
        }

        release.builtin_packages = build.builtin_packages()?;

        let extras: Vec<Package> = release
            .fingerprinted_packages
            .iter()
            .map(FingerprintedPackage::package)
            .filter(|package| !release.builtin_packages.contains(package))
            .collect();
        release.extra_packages.extend(extras);

        for (image, architecture) in build.images()? {
            release.add_image(&image, &Architecture::from(architecture))?;
        }

        info!(
            "Release {}: {} architectures, {} packages ({} builtin, {} extra), {} images",
            release.name,
            release.architectures.len(),
            release.fingerprinted_packages.len(),
            release.builtin_packages.len(),
            release.extra_packages.len(),
            release.fingerprinted_images.len()
        );
        Ok(release)
    }

    /// Load an existing release
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(Error::NotFound(format!("Release at {}", path.display())));
        }

        let mut release = Self::empty(path)?;
        release.architectures = table::read_records(&path.join(ARCHITECTURES_FILE))?;
        release.builtin_packages = table::read_records(&path.join(BUILTIN_PACKAGES_FILE))?;
        release.extra_packages = table::read_records(&path.join(EXTRA_PACKAGES_FILE))?;
        release.fingerprinted_packages =
            table::read_records(&path.join(FINGERPRINTED_PACKAGES_FILE))?;
        release.fingerprinted_images =
            table::read_records(&path.join(FINGERPRINTED_IMAGES_FILE))?;
        release.package_upgrades = table::read_records(&path.join(PACKAGE_UPGRADES_FILE))?;

        debug!(
            "Opened release {} ({} packages)",
            release.name,
            release.fingerprinted_packages.len()
        );
        Ok(release)
    }

    /// Check constraints, then write every set file
    pub fn save(&self) -> Result<()> {
        self.check_constraints()?;

        fs::create_dir_all(&self.path)?;
        table::write_records(&self.path.join(ARCHITECTURES_FILE), &self.architectures)?;
        table::write_records(&self.path.join(BUILTIN_PACKAGES_FILE), &self.builtin_packages)?;
        table::write_records(&self.path.join(EXTRA_PACKAGES_FILE), &self.extra_packages)?;
        table::write_records(
            &self.path.join(FINGERPRINTED_PACKAGES_FILE),
            &self.fingerprinted_packages,
        )?;
        table::write_records(
            &self.path.join(FINGERPRINTED_IMAGES_FILE),
            &self.fingerprinted_images,
        )?;
        table::write_records(&self.path.join(PACKAGE_UPGRADES_FILE), &self.package_upgrades)?;

        info!("Saved release {}", self.name);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn architectures(&self) -> &BTreeSet<Architecture> {
        &self.architectures
    }

    pub fn builtin_packages(&self) -> &BTreeSet<Package> {
        &self.builtin_packages
    }

    pub fn extra_packages(&self) -> &BTreeSet<Package> {
        &self.extra_packages
    }

    pub fn packages(&self) -> &BTreeSet<FingerprintedPackage> {
        &self.fingerprinted_packages
    }

    pub fn images(&self) -> &BTreeSet<FingerprintedImage> {
        &self.fingerprinted_images
    }

    pub fn upgrades(&self) -> &BTreeSet<UpgradePin> {
        &self.package_upgrades
    }

    /// Where an image's copy lives inside the release
    pub fn image_path(&self, image: &FingerprintedImage) -> PathBuf {
        self.path.join(IMAGES_DIR).join(&image.name)
    }

    /// Store a package blob and record its fingerprint
    ///
    /// The blob is parsed before it is stored, so unparseable content never
    /// reaches the content store.
    pub fn add_package<P: PackageParser + ?Sized>(
        &mut self,
        content: &[u8],
        parser: &P,
    ) -> Result<FingerprintedPackage> {
        let parsed = parser.parse(content)?;
        let hash = hash::sha256(content);
        let fingerprinted = FingerprintedPackage::new(parsed.package, hash);

        if let Some(existing) = self
            .fingerprinted_packages
            .iter()
            .find(|fp| fp.package() == fingerprinted.package() && fp.hash != fingerprinted.hash)
        {
            return Err(Error::ConstraintViolation(format!(
                "Package {} already has fingerprint {}",
                fingerprinted.package(),
                existing.hash
            )));
        }

        self.store.put(content)?;
        debug!("Added package {} ({})", fingerprinted.package(), fingerprinted.hash);
        self.fingerprinted_packages.insert(fingerprinted.clone());
        Ok(fingerprinted)
    }

    pub fn add_package_file<P: PackageParser + ?Sized>(
        &mut self,
        path: &Path,
        parser: &P,
    ) -> Result<FingerprintedPackage> {
        let content = fs::read(path)?;
        self.add_package(&content, parser)
    }

    pub fn add_package_url<P: PackageParser + ?Sized>(
        &mut self,
        url: &str,
        parser: &P,
    ) -> Result<FingerprintedPackage> {
        let content = PackageFetcher::new()?.fetch(url)?;
        self.add_package(&content, parser)
    }

    /// Import from a local path, or from a URL when no such path exists
    pub fn add_package_from<P: PackageParser + ?Sized>(
        &mut self,
        location: &str,
        parser: &P,
    ) -> Result<FingerprintedPackage> {
        let path = Path::new(location);
        if path.exists() {
            self.add_package_file(path, parser)
        } else if fetch::is_url(location) {
            info!("{} does not exist locally, treating it as a URL", location);
            self.add_package_url(location, parser)
        } else {
            Err(Error::NotFound(format!("Package file {}", location)))
        }
    }

    /// Copy a firmware image into `images/` and record its fingerprint
    pub fn add_image(
        &mut self,
        path: &Path,
        architecture: &Architecture,
    ) -> Result<FingerprintedImage> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| Error::NotFound(format!("Image {}", path.display())))?;
        let content = fs::read(path)?;
        let image = FingerprintedImage {
            name,
            architecture: architecture.clone(),
            hash: hash::sha256(&content),
        };

        let destination = self.image_path(&image);
        if destination.exists()
            && hash::hash_file(hash::HashAlgorithm::Sha256, &destination)? != image.hash
        {
            return Err(Error::AlreadyExists(format!(
                "Different image named {} in release {}",
                image.name, self.name
            )));
        }

        fs::create_dir_all(self.path.join(IMAGES_DIR))?;
        fs::write(&destination, &content)?;
        debug!("Added image {} ({})", image.name, image.architecture);
        self.fingerprinted_images.insert(image.clone());
        Ok(image)
    }

    pub fn set_architectures(&mut self, architectures: BTreeSet<Architecture>) {
        self.architectures = architectures;
    }

    pub fn set_builtins(&mut self, builtins: BTreeSet<Package>) {
        self.builtin_packages = builtins;
    }

    pub fn add_extra_package(&mut self, package: Package) {
        self.extra_packages.insert(package);
    }

    pub fn remove_extra_package(&mut self, package: &Package) -> Result<()> {
        if !self.extra_packages.remove(package) {
            return Err(Error::NotFound(format!(
                "Extra package {} in release {}",
                package, self.name
            )));
        }
        Ok(())
    }

    /// The fingerprint recorded for a package identity
    pub fn fingerprint(&self, package: &Package) -> Option<&FingerprintedPackage> {
        self.fingerprinted_packages
            .iter()
            .find(|fp| {
                fp.name == package.name
                    && fp.version == package.version
                    && fp.architecture == package.architecture
            })
    }

    /// Content store path of a package, if it is fingerprinted
    pub fn locate(&self, package: &Package) -> Option<PathBuf> {
        self.fingerprint(package).map(|fp| self.store.path(&fp.hash))
    }

    /// Pin a version for a group or device, replacing any earlier pin
    pub fn set_upgrade(
        &mut self,
        group: &str,
        name: &str,
        version: &str,
        architecture: &Architecture,
    ) -> Result<()> {
        table::validate_name(group)?;
        self.package_upgrades.retain(|pin| {
            !(pin.group == group && pin.name == name && &pin.architecture == architecture)
        });
        self.package_upgrades
            .insert(UpgradePin::new(group, name, version, architecture.clone()));
        debug!("Pinned {} {} ({}) for {}", name, version, architecture, group);
        Ok(())
    }

    pub fn upgrades_for(
        &self,
        group: &str,
        name: &str,
        architecture: &Architecture,
    ) -> Option<&UpgradePin> {
        self.package_upgrades
            .iter()
            .find(|pin| pin.group == group && pin.name == name && &pin.architecture == architecture)
    }

    /// `all` expands to every release architecture, anything else to itself
    pub fn expand_architecture(&self, architecture: &Architecture) -> Vec<Architecture> {
        if architecture.is_wildcard() {
            self.architectures.iter().cloned().collect()
        } else {
            vec![architecture.clone()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::ParsedPackage;
    use tempfile::TempDir;

    /// Parses "name version arch" blobs
    struct TextParser;

    impl PackageParser for TextParser {
        fn parse(&self, content: &[u8]) -> Result<ParsedPackage> {
            let text = String::from_utf8_lossy(content).to_string();
            let parts: Vec<&str> = text.split_whitespace().collect();
            if parts.len() != 3 {
                return Err(Error::ParseError(text));
            }
            Ok(ParsedPackage {
                package: Package::new(parts[0], parts[1], parts[2]),
                control: String::new(),
            })
        }
    }

    fn new_release(temp_dir: &TempDir) -> Release {
        let mut release = Release::empty(&temp_dir.path().join("r1")).unwrap();
        release.set_architectures(["x", "y"].into_iter().map(Architecture::from).collect());
        release
    }

    #[test]
    fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut release = new_release(&temp_dir);
        release.add_package(b"foo 1.0 x", &TextParser).unwrap();
        release.add_package(b"foo 1.1 x", &TextParser).unwrap();
        release.add_package(b"bar 2.0 all", &TextParser).unwrap();
        release.set_builtins([Package::new("foo", "1.0", "x")].into_iter().collect());
        release.add_extra_package(Package::new("bar", "2.0", "all"));
        release
            .set_upgrade("g1", "foo", "1.1", &Architecture::from("x"))
            .unwrap();
        release.save().unwrap();

        let reopened = Release::open(release.path()).unwrap();
        assert_eq!(reopened.architectures(), release.architectures());
        assert_eq!(reopened.builtin_packages(), release.builtin_packages());
        assert_eq!(reopened.extra_packages(), release.extra_packages());
        assert_eq!(reopened.packages(), release.packages());
        assert_eq!(reopened.upgrades(), release.upgrades());
    }

    #[test]
    fn test_open_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            Release::open(&temp_dir.path().join("nope")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_add_package_rejects_unparseable() {
        let temp_dir = TempDir::new().unwrap();
        let mut release = new_release(&temp_dir);
        assert!(matches!(
            release.add_package(b"garbage", &TextParser),
            Err(Error::ParseError(_))
        ));
        assert!(release.store().hashes().unwrap().is_empty());
    }

    #[test]
    fn test_add_package_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut release = new_release(&temp_dir);
        let first = release.add_package(b"foo 1.0 x", &TextParser).unwrap();
        let second = release.add_package(b"foo 1.0 x", &TextParser).unwrap();
        assert_eq!(first, second);
        assert_eq!(release.packages().len(), 1);
        assert_eq!(release.locate(&first.package()), Some(release.store().path(&first.hash)));
    }

    #[test]
    fn test_set_upgrade_last_write_wins() {
        let temp_dir = TempDir::new().unwrap();
        let mut release = new_release(&temp_dir);
        let x = Architecture::from("x");
        release.set_upgrade("g1", "foo", "1.1", &x).unwrap();
        release.set_upgrade("g1", "foo", "1.2", &x).unwrap();
        release.set_upgrade("g2", "foo", "1.1", &x).unwrap();

        assert_eq!(release.upgrades().len(), 2);
        assert_eq!(release.upgrades_for("g1", "foo", &x).unwrap().version, "1.2");
    }

    #[test]
    fn test_remove_missing_extra() {
        let temp_dir = TempDir::new().unwrap();
        let mut release = new_release(&temp_dir);
        let result = release.remove_extra_package(&Package::new("nope", "1", "x"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_expand_architecture() {
        let temp_dir = TempDir::new().unwrap();
        let release = new_release(&temp_dir);
        assert_eq!(
            release.expand_architecture(&Architecture::from("all")),
            vec![Architecture::from("x"), Architecture::from("y")]
        );
        assert_eq!(
            release.expand_architecture(&Architecture::from("z")),
            vec![Architecture::from("z")]
        );
    }

    #[test]
    fn test_add_image() {
        let temp_dir = TempDir::new().unwrap();
        let mut release = new_release(&temp_dir);
        let source = temp_dir.path().join("firmware.bin");
        fs::write(&source, b"image").unwrap();

        let image = release.add_image(&source, &Architecture::from("x")).unwrap();
        assert_eq!(image.hash, hash::sha256(b"image"));
        assert_eq!(fs::read(release.image_path(&image)).unwrap(), b"image");
    }

    #[test]
    fn test_add_package_from_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let mut release = new_release(&temp_dir);
        let result = release.add_package_from("/does/not/exist.ipk", &TextParser);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
