// tests/release.rs

//! Release, group and experiment bookkeeping through a repository root.

mod common;

use common::{BuildSpec, Fixture, ipk};
use firmrel::packages::{IpkParser, PackageParser};
use firmrel::{Architecture, Error, ExperimentPackage, Flag, Package, Release};
use std::fs;

fn spec() -> BuildSpec<'static> {
    BuildSpec {
        architectures: vec!["ar1", "ar2"],
        builtins: vec![("base-files", "1.0", "ar1"), ("busybox", "1.36", "ar1")],
        extras: vec![("tcpdump", "4.99", "ar1"), ("luci", "git-1", "all")],
    }
}

#[test]
fn test_new_release_snapshot() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());

    let release = fixture.tree.open_release("r1").unwrap();
    assert_eq!(release.name(), "r1");
    assert_eq!(
        release.architectures().iter().map(Architecture::as_str).collect::<Vec<_>>(),
        vec!["ar1", "ar2"]
    );
    assert!(release.builtin_packages().contains(&Package::new("busybox", "1.36", "ar1")));
    assert!(release.extra_packages().contains(&Package::new("luci", "git-1", "all")));
    assert!(!release.extra_packages().contains(&Package::new("busybox", "1.36", "ar1")));
    assert_eq!(release.packages().len(), 4);
    assert_eq!(release.images().len(), 2);

    for fingerprinted in release.packages() {
        let blob = release.store().read(&fingerprinted.hash).unwrap();
        let parsed = IpkParser::new().parse(&blob).unwrap();
        assert_eq!(parsed.package, fingerprinted.package());
    }

    release.check_constraints().unwrap();
    assert_eq!(fixture.tree.release_names().unwrap(), vec!["r1".to_string()]);
}

#[test]
fn test_release_name_taken() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());

    let build_root = fixture.scratch("build-r1");
    let result = fixture.tree.new_release("r1", &build_root, &IpkParser::new());
    assert!(matches!(result, Err(Error::AlreadyExists(_))));
}

#[test]
fn test_not_a_build_tree() {
    let fixture = Fixture::new();
    let empty = fixture.scratch("empty");
    fs::create_dir_all(&empty).unwrap();

    let result = fixture.tree.new_release("r1", &empty, &IpkParser::new());
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(!fixture.tree.release_path("r1").exists());
}

#[test]
fn test_reimport_is_idempotent() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());
    fixture.import("r1", "tcpdump", "4.99", "ar1");

    let release = fixture.tree.open_release("r1").unwrap();
    assert_eq!(release.packages().len(), 4);
}

#[test]
fn test_same_identity_different_content_rejected() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());

    // Same control data, different payload
    let mut content = ipk("tcpdump", "4.99", "ar1");
    content.extend_from_slice(&[0u8; 512]);
    let path = fixture.scratch("tcpdump_4.99_ar1.ipk");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, &content).unwrap();

    let mut release = fixture.tree.open_release("r1").unwrap();
    let result = release.add_package_file(&path, &IpkParser::new());
    assert!(matches!(result, Err(Error::ConstraintViolation(_))));
}

#[test]
fn test_extra_packages_round_trip() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());
    fixture.import("r1", "iperf3", "3.16", "ar2");

    let iperf = Package::new("iperf3", "3.16", "ar2");
    fixture.tree.add_extra_package("r1", iperf.clone()).unwrap();
    assert!(fixture.tree.open_release("r1").unwrap().extra_packages().contains(&iperf));

    fixture.tree.remove_extra_package("r1", &iperf).unwrap();
    assert!(!fixture.tree.open_release("r1").unwrap().extra_packages().contains(&iperf));

    let result = fixture.tree.remove_extra_package("r1", &iperf);
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_unfingerprinted_extra_rejected() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());

    let result = fixture
        .tree
        .add_extra_package("r1", Package::new("ghost", "1.0", "ar1"));
    assert!(matches!(result, Err(Error::ConstraintViolation(_))));
    assert!(
        !fixture
            .tree
            .open_release("r1")
            .unwrap()
            .extra_packages()
            .contains(&Package::new("ghost", "1.0", "ar1"))
    );
}

#[test]
fn test_upgrade_requires_builtin() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());
    fixture.import("r1", "tcpdump", "5.0", "ar1");

    let ar1 = Architecture::from("ar1");
    let result = fixture
        .tree
        .upgrade_package("r1", "tcpdump", "5.0", &ar1, &["default".to_string()]);
    assert!(matches!(result, Err(Error::ConstraintViolation(_))));

    fixture.import("r1", "busybox", "1.37", "ar1");
    fixture
        .tree
        .upgrade_package("r1", "busybox", "1.37", &ar1, &["default".to_string(), "lab".to_string()])
        .unwrap();

    let release = fixture.tree.open_release("r1").unwrap();
    assert_eq!(release.upgrades().len(), 2);
    assert_eq!(release.upgrades_for("lab", "busybox", &ar1).unwrap().version, "1.37");
}

#[test]
fn test_tampered_store_fails_check() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());

    let release = fixture.tree.open_release("r1").unwrap();
    let victim = release.packages().iter().next().unwrap().clone();
    fs::write(release.store().path(&victim.hash), b"corrupted").unwrap();

    let result = fixture.tree.check_constraints();
    assert!(matches!(result, Err(Error::IntegrityError(_))));
}

#[test]
fn test_url_location_requires_network_or_file() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());
    let missing = fixture.scratch("nowhere.ipk").to_string_lossy().to_string();

    let result = fixture.tree.add_packages("r1", &[missing], &IpkParser::new());
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_experiment_package_must_not_shadow_release() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());

    let mut catalog = fixture.tree.open_experiments().unwrap();
    catalog.new_experiment("vpn", "VPN", "WireGuard client").unwrap();
    fixture.tree.save_experiments(&catalog).unwrap();

    // luci is already an extra of r1
    let shadow = ExperimentPackage::new("default", "r1", "luci", "git-1", "all");
    assert!(matches!(
        fixture.tree.add_experiment_package("vpn", shadow),
        Err(Error::ConstraintViolation(_))
    ));

    let unknown = ExperimentPackage::new("default", "r1", "wireguard", "1.0", "ar1");
    assert!(matches!(
        fixture.tree.add_experiment_package("vpn", unknown),
        Err(Error::NotFound(_))
    ));

    fixture.import("r1", "wireguard", "1.0", "ar1");
    fixture
        .tree
        .add_experiment_package(
            "vpn",
            ExperimentPackage::new("default", "r1", "wireguard", "1.0", "ar1"),
        )
        .unwrap();
    let catalog = fixture.tree.open_experiments().unwrap();
    assert_eq!(catalog.get("vpn").unwrap().packages().len(), 1);
}

#[test]
fn test_required_experiments_cannot_conflict() {
    let fixture = Fixture::new();
    let mut catalog = fixture.tree.open_experiments().unwrap();
    catalog.new_experiment("a", "A", "").unwrap();
    catalog.new_experiment("b", "B", "").unwrap();
    catalog.add_conflict("a", "b").unwrap();
    catalog.set_flag("a", Flag::Required, "g1", true).unwrap();
    fixture.tree.save_experiments(&catalog).unwrap();

    catalog.set_flag("b", Flag::Required, "g2", true).unwrap();
    assert!(matches!(
        fixture.tree.save_experiments(&catalog),
        Err(Error::ConstraintViolation(_))
    ));

    // Nothing from the rejected change was written
    let reloaded = fixture.tree.open_experiments().unwrap();
    assert!(!reloaded.get("b").unwrap().is_required("g2"));
    assert_eq!(reloaded.implicit_conflicts("b"), vec!["a".to_string()]);
}

#[test]
fn test_groups_round_trip() {
    let fixture = Fixture::new();
    fixture.group("lab", &["n1", "n2"]);

    let mut groups = fixture.tree.open_groups().unwrap();
    groups.copy_group("lab", "lab-copy").unwrap();
    groups.remove_member("lab-copy", "n1").unwrap();
    groups.save().unwrap();

    let mut groups = fixture.tree.open_groups().unwrap();
    assert_eq!(groups.names(), vec!["lab".to_string(), "lab-copy".to_string()]);
    assert_eq!(groups.members("lab").unwrap().len(), 2);
    assert_eq!(groups.members("lab-copy").unwrap().len(), 1);
    assert!(matches!(groups.new_group("default"), Err(Error::ReservedName(_))));

    groups.delete_group("lab").unwrap();
    groups.save().unwrap();
    let groups = fixture.tree.open_groups().unwrap();
    assert_eq!(groups.names(), vec!["lab-copy".to_string()]);
}

#[test]
fn test_release_files_are_plain_text() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());
    let path = fixture.tree.release_path("r1");

    let builtins = fs::read_to_string(path.join("builtin-packages")).unwrap();
    let mut lines = builtins.lines();
    assert_eq!(lines.next(), Some("name version architecture"));
    assert_eq!(lines.next(), Some("base-files 1.0 ar1"));
    assert_eq!(lines.next(), Some("busybox 1.36 ar1"));

    let reopened = Release::open(&path).unwrap();
    assert_eq!(reopened.builtin_packages().len(), 2);
}

#[test]
fn test_upgrade_pin_token_must_be_a_file_name() {
    let fixture = Fixture::new();
    fixture.release("r1", &spec());
    fixture.import("r1", "busybox", "1.37", "ar1");

    let ar1 = Architecture::from("ar1");
    for token in ["lab/n1", "."] {
        let result =
            fixture.tree.upgrade_package("r1", "busybox", "1.37", &ar1, &[token.to_string()]);
        assert!(matches!(result, Err(Error::ParseError(_))));
    }
    assert!(fixture.tree.open_release("r1").unwrap().upgrades().is_empty());
}
