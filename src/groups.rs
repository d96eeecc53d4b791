// src/groups.rs

//! Device groups
//!
//! A group is a named set of device identifiers, stored as `groups/<name>`
//! with one device per line. Everything that is assigned "to a group" in a
//! release or experiment is really assigned to a token: a group name, a
//! single device, or the reserved pseudo-device `default` that supplies
//! values for devices without an explicit assignment.

use crate::error::{Error, Result};
use crate::filesystem::table::{self, validate_name};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reserved token naming the fallback pseudo-device
pub const DEFAULT_NODE: &str = "default";

/// A deployment node: one device, or the fallback pseudo-device
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    Default,
    Device(String),
}

impl Node {
    /// Interpret a token as a node, mapping `default` to [`Node::Default`]
    pub fn from_token(token: &str) -> Self {
        if token == DEFAULT_NODE {
            Node::Default
        } else {
            Node::Device(token.to_string())
        }
    }

    /// Device identifier, `None` for the default node
    pub fn device(&self) -> Option<&str> {
        match self {
            Node::Default => None,
            Node::Device(name) => Some(name),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Default => f.write_str(DEFAULT_NODE),
            Node::Device(name) => f.write_str(name),
        }
    }
}

/// What a group-or-device token refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Group { name: String, members: BTreeSet<String> },
    Device(Node),
}

impl Target {
    /// Every node the target expands to
    pub fn nodes(&self) -> Vec<Node> {
        match self {
            Target::Group { members, .. } => {
                members.iter().map(|m| Node::Device(m.clone())).collect()
            }
            Target::Device(node) => vec![node.clone()],
        }
    }
}

/// All groups under one directory, loaded and saved as a whole
#[derive(Debug, Clone)]
pub struct GroupDirectory {
    root: PathBuf,
    groups: BTreeMap<String, BTreeSet<String>>,
    pending_deletions: BTreeSet<String>,
}

impl GroupDirectory {
    /// Load every group file under `root`; a missing directory has no groups
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut groups = BTreeMap::new();

        if root.is_dir() {
            for entry in fs::read_dir(&root)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }
                let members = table::read_lines(&entry.path())?;
                groups.insert(name, members);
            }
        }

        debug!("Loaded {} groups from {}", groups.len(), root.display());
        Ok(Self {
            root,
            groups,
            pending_deletions: BTreeSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a token to a group, a device, or the default node
    pub fn resolve(&self, token: &str) -> Target {
        match self.groups.get(token) {
            Some(members) => Target::Group {
                name: token.to_string(),
                members: members.clone(),
            },
            None => Target::Device(Node::from_token(token)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Group names, sorted
    pub fn names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn members(&self, name: &str) -> Result<&BTreeSet<String>> {
        self.groups
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Group '{}'", name)))
    }

    /// Every device that belongs to at least one group
    pub fn all_devices(&self) -> BTreeSet<String> {
        self.groups.values().flatten().cloned().collect()
    }

    pub fn new_group(&mut self, name: &str) -> Result<()> {
        if name == DEFAULT_NODE {
            return Err(Error::ReservedName(name.to_string()));
        }
        validate_name(name)?;
        if self.groups.contains_key(name) {
            return Err(Error::AlreadyExists(format!("Group '{}'", name)));
        }
        self.groups.insert(name.to_string(), BTreeSet::new());
        self.pending_deletions.remove(name);
        info!("Created group {}", name);
        Ok(())
    }

    /// Create `new_name` with the same members as `name`
    pub fn copy_group(&mut self, name: &str, new_name: &str) -> Result<()> {
        let members = self.members(name)?.clone();
        self.new_group(new_name)?;
        self.groups.insert(new_name.to_string(), members);
        info!("Copied group {} to {}", name, new_name);
        Ok(())
    }

    /// Remove a group; its file is deleted on the next save
    pub fn delete_group(&mut self, name: &str) -> Result<()> {
        if self.groups.remove(name).is_none() {
            return Err(Error::NotFound(format!("Group '{}'", name)));
        }
        self.pending_deletions.insert(name.to_string());
        info!("Deleted group {}", name);
        Ok(())
    }

    pub fn add_member(&mut self, name: &str, device: &str) -> Result<()> {
        if device == DEFAULT_NODE {
            return Err(Error::ReservedName(device.to_string()));
        }
        validate_name(device)?;
        let members = self
            .groups
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("Group '{}'", name)))?;
        members.insert(device.to_string());
        debug!("Added {} to group {}", device, name);
        Ok(())
    }

    pub fn remove_member(&mut self, name: &str, device: &str) -> Result<()> {
        let members = self
            .groups
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("Group '{}'", name)))?;
        if !members.remove(device) {
            return Err(Error::NotFound(format!("Device '{}' in group '{}'", device, name)));
        }
        debug!("Removed {} from group {}", device, name);
        Ok(())
    }

    /// Write every group file and delete the files of removed groups
    pub fn save(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        for (name, members) in &self.groups {
            table::write_lines(&self.root.join(name), members)?;
        }
        for name in &self.pending_deletions {
            let path = self.root.join(name);
            if path.exists() {
                fs::remove_file(&path)?;
                debug!("Removed group file {}", path.display());
            }
        }
        self.pending_deletions.clear();
        Ok(())
    }
}
