// src/cli/release.rs
//! Release management commands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ReleaseCommands {
    /// Create a release from a firmware build tree
    New {
        /// Release name
        name: String,

        /// Build root containing .config, bin/ and build_dir/
        build_root: PathBuf,
    },

    /// List releases
    List,

    /// List the architectures of a release
    Architectures {
        release: String,
    },

    /// List fingerprinted packages
    Packages {
        /// Only this release (default: all)
        #[arg(long)]
        release: Option<String>,
    },

    /// List builtin packages
    Builtins {
        #[arg(long)]
        release: Option<String>,

        /// Only packages installable on this architecture
        #[arg(long)]
        architecture: Option<String>,
    },

    /// List extra packages
    Extras {
        #[arg(long)]
        release: Option<String>,

        #[arg(long)]
        architecture: Option<String>,
    },

    /// Import package files or URLs into a release
    AddPackages {
        release: String,

        /// Package files or http(s) URLs
        #[arg(required = true)]
        locations: Vec<String>,
    },

    /// Mark an imported package as extra
    AddExtra {
        release: String,
        name: String,
        version: String,
        architecture: String,
    },

    /// Remove a package from the extra set
    RemoveExtra {
        release: String,
        name: String,
        version: String,
        architecture: String,
    },

    /// Pin a package version for groups or devices
    Upgrade {
        release: String,
        name: String,
        version: String,
        architecture: String,

        /// Groups, devices, or "default"
        #[arg(required = true)]
        groups: Vec<String>,
    },

    /// List upgrade pins
    Upgrades {
        #[arg(long)]
        release: Option<String>,
    },
}
