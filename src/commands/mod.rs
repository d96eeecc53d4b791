// src/commands/mod.rs
//! Command handlers for the firmrel CLI

mod deploy;
mod experiment;
mod group;
mod release;

use crate::cli::GlobalArgs;
use anyhow::{Context as _, Result};
use firmrel::{Config, ReleaseTree};
use std::path::PathBuf;

// Re-export all command handlers
pub use deploy::{cmd_check, cmd_deploy};
pub use experiment::{
    cmd_experiment_add_conflict, cmd_experiment_add_package, cmd_experiment_flag,
    cmd_experiment_list, cmd_experiment_list_all, cmd_experiment_new, cmd_experiment_packages,
    cmd_experiment_remove_conflict, cmd_experiment_remove_package,
};
pub use group::{
    cmd_group_add, cmd_group_copy, cmd_group_delete, cmd_group_list, cmd_group_list_all,
    cmd_group_new, cmd_group_remove,
};
pub use release::{
    cmd_release_add_extra, cmd_release_add_packages, cmd_release_architectures,
    cmd_release_builtins, cmd_release_extras, cmd_release_list, cmd_release_new,
    cmd_release_packages, cmd_release_remove_extra, cmd_release_upgrade, cmd_release_upgrades,
};

/// Repository and configuration every command runs against
pub struct Context {
    pub tree: ReleaseTree,
    pub config: Config,
}

impl Context {
    pub fn from_args(global: &GlobalArgs) -> Result<Self> {
        let root: PathBuf = firmrel::config::resolve_root(global.root.as_deref())?;
        let config = Config::discover(&root, global.config.as_deref())
            .with_context(|| format!("Failed to load configuration for {}", root.display()))?;
        Ok(Self {
            tree: ReleaseTree::new(root),
            config,
        })
    }
}

/// Print rows sorted, with each column padded to its widest cell
pub(crate) fn print_table(headers: &[&str], mut rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("(none)");
        return;
    }
    rows.sort();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    println!("{}", format_row(headers, &widths));
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        println!("{}", format_row(&cells, &widths));
    }
}

fn format_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
