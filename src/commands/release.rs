// src/commands/release.rs
//! Release management commands

use super::{Context, print_table};
use anyhow::{Context as _, Result};
use firmrel::packages::IpkParser;
use firmrel::{Architecture, Package, Release};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// Create a release from a build tree
pub fn cmd_release_new(ctx: &Context, name: &str, build_root: &Path) -> Result<()> {
    info!("Creating release {} from {}", name, build_root.display());
    let release = ctx
        .tree
        .new_release(name, build_root, &IpkParser::new())
        .with_context(|| format!("Failed to create release '{}'", name))?;

    println!("Created release: {}", release.name());
    println!("  Architectures: {}", release.architectures().len());
    println!("  Builtin packages: {}", release.builtin_packages().len());
    println!("  Extra packages: {}", release.extra_packages().len());
    println!("  Images: {}", release.images().len());
    Ok(())
}

pub fn cmd_release_list(ctx: &Context) -> Result<()> {
    for name in ctx.tree.release_names()? {
        println!("{}", name);
    }
    Ok(())
}

pub fn cmd_release_architectures(ctx: &Context, release: &str) -> Result<()> {
    let release = ctx.tree.open_release(release)?;
    for architecture in release.architectures() {
        println!("{}", architecture);
    }
    Ok(())
}

/// List fingerprinted packages with their hashes
pub fn cmd_release_packages(ctx: &Context, release: Option<&str>) -> Result<()> {
    let releases = ctx.tree.select_releases(release)?;
    let rows = releases
        .iter()
        .flat_map(|release| {
            release.packages().iter().map(move |package| {
                vec![
                    release.name().to_string(),
                    package.name.clone(),
                    package.version.clone(),
                    package.architecture.to_string(),
                    package.hash.clone(),
                ]
            })
        })
        .collect();
    print_table(&["RELEASE", "NAME", "VERSION", "ARCHITECTURE", "SHA256"], rows);
    Ok(())
}

pub fn cmd_release_builtins(
    ctx: &Context,
    release: Option<&str>,
    architecture: Option<&str>,
) -> Result<()> {
    let releases = ctx.tree.select_releases(release)?;
    print_packages(&releases, architecture, Release::builtin_packages);
    Ok(())
}

pub fn cmd_release_extras(
    ctx: &Context,
    release: Option<&str>,
    architecture: Option<&str>,
) -> Result<()> {
    let releases = ctx.tree.select_releases(release)?;
    print_packages(&releases, architecture, Release::extra_packages);
    Ok(())
}

fn print_packages(
    releases: &[Release],
    architecture: Option<&str>,
    select: fn(&Release) -> &BTreeSet<Package>,
) {
    let filter = architecture.map(Architecture::from);
    let filter = filter.as_ref();
    let rows = releases
        .iter()
        .flat_map(|release| {
            select(release)
                .iter()
                .filter(move |package| {
                    filter.is_none_or(|arch| package.architecture.is_compatible(arch))
                })
                .map(move |package| {
                    vec![
                        release.name().to_string(),
                        package.name.clone(),
                        package.version.clone(),
                        package.architecture.to_string(),
                    ]
                })
        })
        .collect();
    print_table(&["RELEASE", "NAME", "VERSION", "ARCHITECTURE"], rows);
}

/// Import package files or URLs
pub fn cmd_release_add_packages(ctx: &Context, release: &str, locations: &[String]) -> Result<()> {
    let added = ctx
        .tree
        .add_packages(release, locations, &IpkParser::new())
        .with_context(|| format!("Failed to add packages to release '{}'", release))?;

    for package in &added {
        println!("Added {} [{}]", package.package(), package.hash);
    }
    Ok(())
}

pub fn cmd_release_add_extra(
    ctx: &Context,
    release: &str,
    name: &str,
    version: &str,
    architecture: &str,
) -> Result<()> {
    let package = Package::new(name, version, architecture);
    ctx.tree
        .add_extra_package(release, package.clone())
        .with_context(|| format!("Failed to add extra package to release '{}'", release))?;
    println!("Added extra package {} to {}", package, release);
    Ok(())
}

pub fn cmd_release_remove_extra(
    ctx: &Context,
    release: &str,
    name: &str,
    version: &str,
    architecture: &str,
) -> Result<()> {
    let package = Package::new(name, version, architecture);
    ctx.tree
        .remove_extra_package(release, &package)
        .with_context(|| format!("Failed to remove extra package from release '{}'", release))?;
    println!("Removed extra package {} from {}", package, release);
    Ok(())
}

/// Pin a package version for groups or devices
pub fn cmd_release_upgrade(
    ctx: &Context,
    release: &str,
    name: &str,
    version: &str,
    architecture: &str,
    groups: &[String],
) -> Result<()> {
    ctx.tree
        .upgrade_package(release, name, version, &Architecture::from(architecture), groups)
        .with_context(|| format!("Failed to pin {} {} in release '{}'", name, version, release))?;
    println!("Pinned {} {} ({}) for {}", name, version, architecture, groups.join(", "));
    Ok(())
}

pub fn cmd_release_upgrades(ctx: &Context, release: Option<&str>) -> Result<()> {
    let releases = ctx.tree.select_releases(release)?;
    let rows = releases
        .iter()
        .flat_map(|release| {
            release.upgrades().iter().map(move |pin| {
                vec![
                    release.name().to_string(),
                    pin.group.clone(),
                    pin.name.clone(),
                    pin.version.clone(),
                    pin.architecture.to_string(),
                ]
            })
        })
        .collect();
    print_table(&["RELEASE", "GROUP", "NAME", "VERSION", "ARCHITECTURE"], rows);
    Ok(())
}
