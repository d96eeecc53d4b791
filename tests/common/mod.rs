// tests/common/mod.rs

//! Shared test utilities: synthetic ipk archives and build trees.

#![allow(dead_code)]

use firmrel::deploy::{SIGNATURE_FILE, Signer};
use firmrel::{Error, ReleaseTree};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Gzipped tar with the given (path, content) members
fn tar_gz(members: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Control file text for a package
pub fn control(name: &str, version: &str, architecture: &str) -> String {
    format!(
        "Package: {}\nVersion: {}\nArchitecture: {}\nMaintainer: Test <test@example.com>\n\
         Description: {} test package\n",
        name, version, architecture, name
    )
}

/// A minimal ipk in the gzipped-tar layout opkg-build produces
pub fn ipk(name: &str, version: &str, architecture: &str) -> Vec<u8> {
    let control = control(name, version, architecture);
    let control_tar = tar_gz(&[("./control", control.as_bytes())]);

    let binary_path = format!("./usr/bin/{}", name);
    let binary = format!("#!/bin/sh\necho {}\n", name);
    let data_tar = tar_gz(&[(binary_path.as_str(), binary.as_bytes())]);

    let debian_binary: &[u8] = b"2.0\n";
    tar_gz(&[
        ("./debian-binary", debian_binary),
        ("./control.tar.gz", control_tar.as_slice()),
        ("./data.tar.gz", data_tar.as_slice()),
    ])
}

pub fn ipk_filename(name: &str, version: &str, architecture: &str) -> String {
    format!("{}_{}_{}.ipk", name, version, architecture)
}

/// Write an ipk into `dir` and return its path
pub fn write_ipk(dir: &Path, name: &str, version: &str, architecture: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(ipk_filename(name, version, architecture));
    fs::write(&path, ipk(name, version, architecture)).unwrap();
    path
}

/// Description of a synthetic firmware build
#[derive(Default)]
pub struct BuildSpec<'a> {
    pub architectures: Vec<&'a str>,
    /// Installed in the image: (name, version, architecture)
    pub builtins: Vec<(&'a str, &'a str, &'a str)>,
    /// Built but not installed
    pub extras: Vec<(&'a str, &'a str, &'a str)>,
}

/// Lay out an OpenWrt-style build tree under `root`
///
/// Every package lands in the package directory of the first
/// architecture; each architecture gets one sysupgrade image.
pub fn write_build(root: &Path, spec: &BuildSpec<'_>) {
    fs::create_dir_all(root.join("build_dir")).unwrap();
    fs::write(root.join(".config"), "CONFIG_TARGET_test=y\n").unwrap();

    for architecture in &spec.architectures {
        let bin = root.join("bin").join(architecture);
        fs::create_dir_all(bin.join("packages")).unwrap();
        fs::write(
            bin.join(format!("openwrt-{}-sysupgrade.bin", architecture)),
            format!("firmware image for {}", architecture),
        )
        .unwrap();
    }

    let packages = root.join("bin").join(spec.architectures[0]).join("packages");
    for (name, version, architecture) in spec.builtins.iter().chain(&spec.extras) {
        write_ipk(&packages, name, version, architecture);
    }

    let info = root.join("build_dir/target-test/root-test/usr/lib/opkg/info");
    fs::create_dir_all(&info).unwrap();
    for (name, version, architecture) in &spec.builtins {
        let control_file = info.join(format!("{}.control", name));
        fs::write(control_file, control(name, version, architecture)).unwrap();
    }
}

/// Temporary repository root plus scratch space
pub struct Fixture {
    pub temp_dir: TempDir,
    pub tree: ReleaseTree,
}

impl Fixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let tree = ReleaseTree::new(temp_dir.path().join("repo"));
        Self { temp_dir, tree }
    }

    /// Path under the scratch area, outside the repository
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("scratch").join(name)
    }

    pub fn staging_parent(&self) -> PathBuf {
        self.temp_dir.path().join("staging")
    }

    /// Write a build tree and create a release from it
    pub fn release(&self, name: &str, spec: &BuildSpec<'_>) {
        let build_root = self.scratch(&format!("build-{}", name));
        write_build(&build_root, spec);
        self.tree
            .new_release(name, &build_root, &firmrel::packages::IpkParser::new())
            .unwrap();
    }

    /// Import a freshly built ipk into a release without marking it extra
    pub fn import(&self, release: &str, name: &str, version: &str, architecture: &str) {
        let path = write_ipk(&self.scratch("incoming"), name, version, architecture);
        self.tree
            .add_packages(
                release,
                &[path.to_string_lossy().to_string()],
                &firmrel::packages::IpkParser::new(),
            )
            .unwrap();
    }

    pub fn group(&self, name: &str, devices: &[&str]) {
        let mut groups = self.tree.open_groups().unwrap();
        groups.new_group(name).unwrap();
        for device in devices {
            groups.add_member(name, device).unwrap();
        }
        groups.save().unwrap();
    }
}

/// Decompressed text of a `Packages.gz`
pub fn read_index(path: &Path) -> String {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(fs::File::open(path).unwrap());
    let mut text = String::new();
    decoder.read_to_string(&mut text).unwrap();
    text
}

/// Writes a marker signature instead of running openssl
#[derive(Default)]
pub struct MarkerSigner {
    pub signed: RefCell<Vec<PathBuf>>,
}

impl Signer for MarkerSigner {
    fn sign(&self, file: &Path) -> firmrel::Result<PathBuf> {
        let signature = file.with_file_name(SIGNATURE_FILE);
        fs::write(&signature, format!("signature of {}\n", file.display()))?;
        self.signed.borrow_mut().push(file.to_path_buf());
        Ok(signature)
    }
}

/// Fails like openssl does with an unusable key
pub struct FailingSigner;

impl Signer for FailingSigner {
    fn sign(&self, file: &Path) -> firmrel::Result<PathBuf> {
        Err(Error::ExternalToolError(format!(
            "Failed to sign {}: unable to load key",
            file.display()
        )))
    }
}
