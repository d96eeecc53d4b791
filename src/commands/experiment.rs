// src/commands/experiment.rs
//! Experiment commands

use super::{Context, print_table};
use anyhow::{Context as _, Result};
use firmrel::{Experiment, ExperimentCatalog, ExperimentPackage, Flag};
use std::collections::BTreeSet;

fn open(ctx: &Context) -> Result<ExperimentCatalog> {
    ctx.tree.open_experiments().context("Failed to open experiment catalog")
}

fn save(ctx: &Context, catalog: &ExperimentCatalog) -> Result<()> {
    ctx.tree
        .save_experiments(catalog)
        .context("Failed to save experiment catalog")
}

fn joined(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        "-".to_string()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

pub fn cmd_experiment_new(
    ctx: &Context,
    name: &str,
    display_name: &str,
    description: &str,
) -> Result<()> {
    let mut catalog = open(ctx)?;
    catalog.new_experiment(name, display_name, description)?;
    save(ctx, &catalog)?;
    println!("Created experiment {}", name);
    Ok(())
}

/// List experiment names, or show one experiment in detail
pub fn cmd_experiment_list(ctx: &Context, name: Option<&str>) -> Result<()> {
    let catalog = open(ctx)?;
    let Some(name) = name else {
        for name in catalog.names() {
            println!("{}", name);
        }
        return Ok(());
    };

    let experiment = catalog.get(name)?;
    let implicit: BTreeSet<String> = catalog.implicit_conflicts(name).into_iter().collect();
    print_experiment(experiment, &implicit);
    Ok(())
}

fn print_experiment(experiment: &Experiment, implicit: &BTreeSet<String>) {
    println!("Experiment: {}", experiment.name);
    println!("  Display name: {}", experiment.display_name);
    if !experiment.description.is_empty() {
        println!("  Description: {}", experiment.description);
    }
    println!("  Conflicts: {}", joined(experiment.conflicts()));
    println!("  Implicit conflicts: {}", joined(implicit));
    println!("  Required: {}", joined(experiment.flag_groups(Flag::Required)));
    println!("  Revoked: {}", joined(experiment.flag_groups(Flag::Revoked)));
    println!(
        "  Installed by default: {}",
        joined(experiment.flag_groups(Flag::InstalledByDefault))
    );
    println!("  Packages: {}", experiment.packages().len());
}

pub fn cmd_experiment_list_all(ctx: &Context) -> Result<()> {
    let catalog = open(ctx)?;
    let mut first = true;
    for experiment in catalog.iter() {
        if !first {
            println!();
        }
        first = false;
        let implicit: BTreeSet<String> =
            catalog.implicit_conflicts(&experiment.name).into_iter().collect();
        print_experiment(experiment, &implicit);
    }
    Ok(())
}

pub fn cmd_experiment_packages(ctx: &Context, name: &str) -> Result<()> {
    let catalog = open(ctx)?;
    let experiment = catalog.get(name)?;
    let rows = experiment
        .packages()
        .iter()
        .map(|package| {
            vec![
                package.group.clone(),
                package.release.clone(),
                package.name.clone(),
                package.version.clone(),
                package.architecture.to_string(),
            ]
        })
        .collect();
    print_table(&["GROUP", "RELEASE", "NAME", "VERSION", "ARCHITECTURE"], rows);
    Ok(())
}

pub fn cmd_experiment_add_package(
    ctx: &Context,
    experiment: &str,
    package: ExperimentPackage,
) -> Result<()> {
    let description = format!("{} for {} in {}", package.package(), package.group, package.release);
    ctx.tree
        .add_experiment_package(experiment, package)
        .with_context(|| format!("Failed to add package to experiment '{}'", experiment))?;
    println!("Added {} to experiment {}", description, experiment);
    Ok(())
}

pub fn cmd_experiment_remove_package(
    ctx: &Context,
    experiment: &str,
    package: &ExperimentPackage,
) -> Result<()> {
    let mut catalog = open(ctx)?;
    catalog.remove_package(experiment, package)?;
    save(ctx, &catalog)?;
    println!("Removed {} from experiment {}", package.package(), experiment);
    Ok(())
}

pub fn cmd_experiment_add_conflict(ctx: &Context, experiment: &str, other: &str) -> Result<()> {
    let mut catalog = open(ctx)?;
    catalog.add_conflict(experiment, other)?;
    save(ctx, &catalog)?;
    println!("Experiment {} now conflicts with {}", experiment, other);
    Ok(())
}

pub fn cmd_experiment_remove_conflict(ctx: &Context, experiment: &str, other: &str) -> Result<()> {
    let mut catalog = open(ctx)?;
    catalog.remove_conflict(experiment, other)?;
    save(ctx, &catalog)?;
    println!("Experiment {} no longer conflicts with {}", experiment, other);
    Ok(())
}

/// Set or clear a per-group flag
pub fn cmd_experiment_flag(
    ctx: &Context,
    experiment: &str,
    flag: Flag,
    value: bool,
    groups: &[String],
) -> Result<()> {
    let mut catalog = open(ctx)?;
    for group in groups {
        catalog.set_flag(experiment, flag, group, value)?;
    }
    save(ctx, &catalog).with_context(|| {
        format!("Flag change on experiment '{}' violates a constraint", experiment)
    })?;
    println!(
        "{} {:?} for {} on experiment {}",
        if value { "Set" } else { "Cleared" },
        flag,
        groups.join(", "),
        experiment
    );
    Ok(())
}
