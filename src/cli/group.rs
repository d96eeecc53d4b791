// src/cli/group.rs
//! Device group commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum GroupCommands {
    /// List groups, or the members of one group
    List {
        name: Option<String>,
    },

    /// List every group with its members
    ListAll,

    /// Create a group
    New {
        name: String,

        /// Initial members
        devices: Vec<String>,
    },

    /// Copy a group under a new name
    Copy {
        name: String,
        new_name: String,
    },

    /// Delete a group
    Delete {
        name: String,
    },

    /// Add devices to a group
    Add {
        group: String,

        #[arg(required = true)]
        devices: Vec<String>,
    },

    /// Remove devices from a group
    Remove {
        group: String,

        #[arg(required = true)]
        devices: Vec<String>,
    },
}
