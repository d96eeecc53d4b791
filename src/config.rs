// src/config.rs

//! Configuration and path defaults
//!
//! The repository root comes from `--root`, else `$FIRMREL_ROOT`, else
//! `~/firmware-releases`. An optional `firmrel.toml` in the root (or the
//! file given by `--config`) supplies deployment settings:
//!
//! ```toml
//! [deploy]
//! destination = "user@host:/var/www/firmware"
//! signing_key = "/etc/firmrel/signing.key"
//! staging_dir = "/var/tmp"
//!
//! [tools]
//! rsync = "rsync"
//! openssl = "openssl"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the default root
pub const ROOT_ENV: &str = "FIRMREL_ROOT";

/// Config filename looked up inside the root
pub const CONFIG_FILE: &str = "firmrel.toml";

/// Root directory name under the home directory
const DEFAULT_ROOT_DIR: &str = "firmware-releases";

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

/// `[deploy]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// rsync destination of the deployment tree
    pub destination: Option<String>,

    /// Private key for `Packages.sig`; unsigned when absent
    pub signing_key: Option<PathBuf>,

    /// Parent directory of staging trees (system temp dir when absent)
    pub staging_dir: Option<PathBuf>,
}

/// `[tools]` section: external program names or paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_rsync")]
    pub rsync: String,

    #[serde(default = "default_openssl")]
    pub openssl: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rsync: default_rsync(),
            openssl: default_openssl(),
        }
    }
}

fn default_rsync() -> String {
    "rsync".to_string()
}

fn default_openssl() -> String {
    "openssl".to_string()
}

impl Config {
    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Load a config file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `explicit` if given, else `<root>/firmrel.toml` if present,
    /// else defaults
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = root.join(CONFIG_FILE);
                if path.is_file() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Resolve the repository root from a flag, the environment or the home dir
pub fn resolve_root(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = flag {
        return Ok(root.to_path_buf());
    }
    if let Ok(root) = std::env::var(ROOT_ENV) {
        if !root.is_empty() {
            return Ok(PathBuf::from(root));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_ROOT_DIR))
        .ok_or_else(|| {
            Error::ConfigError(format!("No home directory; set {} or pass --root", ROOT_ENV))
        })
}
