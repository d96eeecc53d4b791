// src/release/build_tree.rs

//! OpenWrt build tree reader
//!
//! A new release is snapshotted from a finished OpenWrt build:
//!
//! ```text
//! <root>/.config
//! <root>/bin/<arch>/<image files>
//! <root>/bin/<arch>/packages/*.ipk
//! <root>/build_dir/target-*/root-*/usr/lib/opkg/info/*.control
//! ```
//!
//! The installed control files in the target root describe the packages
//! baked into the firmware images (the builtins).

use crate::error::{Error, Result};
use crate::packages::{Package, package_from_control};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A validated OpenWrt build root
#[derive(Debug, Clone)]
pub struct BuildTree {
    root: PathBuf,
}

impl BuildTree {
    /// Check that `root` looks like an OpenWrt build and wrap it
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Checking whether {} is an OpenWrt build tree", root.display());

        if !root.join(".config").is_file() {
            return Err(Error::NotFound(format!("OpenWrt .config in {}", root.display())));
        }
        if !root.join("bin").is_dir() {
            return Err(Error::NotFound(format!("OpenWrt bin/ in {}", root.display())));
        }
        if !root.join("build_dir").is_dir() {
            return Err(Error::NotFound(format!("OpenWrt build_dir/ in {}", root.display())));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Expand a glob relative to the build root
    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&self.root.to_string_lossy()),
            pattern
        );
        let paths = glob::glob(&full)
            .map_err(|e| Error::ParseError(format!("Invalid glob pattern {}: {}", full, e)))?;

        let mut matched = Vec::new();
        for path in paths {
            match path {
                Ok(path) => matched.push(path),
                Err(e) => warn!("Skipping unreadable path: {}", e),
            }
        }
        matched.sort();
        Ok(matched)
    }

    /// Architectures: the directories directly under `bin/`
    pub fn architectures(&self) -> Result<BTreeSet<String>> {
        let mut architectures = BTreeSet::new();
        for path in self.glob("bin/*")? {
            if !path.is_dir() {
                debug!("{} is not an architecture", path.display());
                continue;
            }
            if let Some(name) = path.file_name() {
                architectures.insert(name.to_string_lossy().to_string());
            }
        }
        Ok(architectures)
    }

    /// Firmware images: regular files under `bin/<arch>/`, with their architecture
    pub fn images(&self) -> Result<Vec<(PathBuf, String)>> {
        let mut images = Vec::new();
        for path in self.glob("bin/*/*")? {
            if !path.is_file() {
                debug!("{} is not an image", path.display());
                continue;
            }
            let architecture = path
                .parent()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().to_string());
            if let Some(architecture) = architecture {
                debug!("Found image {} ({})", path.display(), architecture);
                images.push((path, architecture));
            }
        }
        Ok(images)
    }

    /// Packages installed into the firmware root filesystem
    ///
    /// Control files that do not name a package, version and architecture
    /// are skipped with a warning.
    pub fn builtin_packages(&self) -> Result<BTreeSet<Package>> {
        let mut packages = BTreeSet::new();
        for path in self.glob("build_dir/target-*/root-*/usr/lib/opkg/info/*.control")? {
            let control = fs::read_to_string(&path)?;
            match package_from_control(&control) {
                Ok(package) => {
                    debug!("Builtin package {}", package);
                    packages.insert(package);
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(packages)
    }

    /// Every `.ipk` in every `bin/<arch>/packages/` directory
    pub fn package_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for directory in self.glob("bin/*/packages")? {
            if !directory.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&directory)? {
                let path = entry?.path();
                if path.is_file() && path.extension().is_some_and(|ext| ext == "ipk") {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_build() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".config"), "CONFIG_TARGET_ar71xx=y\n").unwrap();
        fs::create_dir_all(root.join("bin/ar71xx/packages")).unwrap();
        fs::write(root.join("bin/ar71xx/openwrt-ar71xx-sysupgrade.bin"), b"image").unwrap();
        fs::write(root.join("bin/ar71xx/packages/foo_1.0_ar71xx.ipk"), b"ipk").unwrap();
        fs::write(root.join("bin/ar71xx/packages/Packages"), b"index").unwrap();

        let info = root.join("build_dir/target-mips/root-ar71xx/usr/lib/opkg/info");
        fs::create_dir_all(&info).unwrap();
        fs::write(
            info.join("foo.control"),
            "Package: foo\nVersion: 1.0\nArchitecture: ar71xx\n",
        )
        .unwrap();
        fs::write(info.join("broken.control"), "Package: broken\n").unwrap();
        temp_dir
    }

    #[test]
    fn test_rejects_non_build() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(BuildTree::open(temp_dir.path()), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_reads_build() {
        let temp_dir = fake_build();
        let build = BuildTree::open(temp_dir.path()).unwrap();

        assert_eq!(build.architectures().unwrap().into_iter().collect::<Vec<_>>(), vec!["ar71xx"]);

        let images = build.images().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].1, "ar71xx");

        let builtins = build.builtin_packages().unwrap();
        assert_eq!(builtins.len(), 1);
        assert!(builtins.contains(&Package::new("foo", "1.0", "ar71xx")));

        let files = build.package_files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("foo_1.0_ar71xx.ipk"));
    }
}
