// src/cli/mod.rs
//! CLI definitions for firmrel
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! Management contexts:
//! - `release` - Release inventories, extra packages, upgrade pins
//! - `group` - Device groups
//! - `experiment` - Experiments, their packages, conflicts and flags
//!
//! Whole-tree commands:
//! - `check` - Validate every constraint
//! - `deploy` - Stage, sign and mirror the deployment tree

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod experiment;
mod group;
mod release;

pub use experiment::{ExperimentCommands, FlagArgs};
pub use group::GroupCommands;
pub use release::ReleaseCommands;

#[derive(Parser)]
#[command(name = "firmrel")]
#[command(version)]
#[command(about = "Manage firmware releases and deploy them to device fleets", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options accepted by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Repository root (default: $FIRMREL_ROOT or ~/firmware-releases)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Configuration file (default: <root>/firmrel.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Release management
    #[command(subcommand)]
    Release(ReleaseCommands),

    /// Device group management
    #[command(subcommand)]
    Group(GroupCommands),

    /// Experiment management
    #[command(subcommand)]
    Experiment(ExperimentCommands),

    /// Check every constraint across the whole repository
    Check,

    /// Build the deployment tree and mirror it to a destination
    Deploy {
        /// rsync destination (overrides the configured one)
        destination: Option<String>,

        /// Private key for signing package indices (must be mode 0400)
        #[arg(long)]
        signing_key: Option<PathBuf>,

        /// Copy without asking; the staging tree is kept
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
