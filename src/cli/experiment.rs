// src/cli/experiment.rs
//! Experiment commands

use clap::{Args, Subcommand};
use firmrel::ExperimentPackage;

#[derive(Subcommand)]
pub enum ExperimentCommands {
    /// Create an experiment
    New {
        name: String,

        /// Human readable name shown on devices
        #[arg(long)]
        display_name: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// List experiments, or show one
    List {
        name: Option<String>,
    },

    /// Show every experiment
    ListAll,

    /// List the packages of an experiment
    Packages {
        name: String,
    },

    /// Assign a release package to an experiment for a group
    AddPackage(PackageArgs),

    /// Remove a package assignment
    RemovePackage(PackageArgs),

    /// Declare that two experiments cannot be enabled together
    AddConflict {
        experiment: String,
        other: String,
    },

    /// Remove a declared conflict
    RemoveConflict {
        experiment: String,
        other: String,
    },

    /// Require the experiment for groups
    Require(FlagArgs),

    /// Stop requiring the experiment for groups
    Unrequire(FlagArgs),

    /// Revoke the experiment for groups
    Revoke(FlagArgs),

    /// Undo a revocation for groups
    Unrevoke(FlagArgs),

    /// Enable the experiment by default for groups
    InstallByDefault(FlagArgs),

    /// Stop enabling the experiment by default for groups
    UninstallByDefault(FlagArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    pub experiment: String,
    /// Group, device, or "default"
    pub group: String,
    pub release: String,
    pub name: String,
    pub version: String,
    pub architecture: String,
}

impl PackageArgs {
    pub fn package(&self) -> ExperimentPackage {
        ExperimentPackage::new(
            self.group.as_str(),
            self.release.as_str(),
            self.name.as_str(),
            self.version.as_str(),
            self.architecture.as_str(),
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct FlagArgs {
    pub experiment: String,

    /// Groups, devices, or "default"
    #[arg(required = true)]
    pub groups: Vec<String>,
}
