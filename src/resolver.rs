// src/resolver.rs

//! Override resolution
//!
//! Releases and experiments assign values to tokens (group names, device
//! names, or `default`). Deployment needs one value per device, so
//! resolution runs in two steps:
//!
//! 1. [`expand_to_nodes`]: every token becomes the nodes it names; two
//!    different values for the same (node, key) are a conflict.
//! 2. [`normalize_default_map`]: for each key, a device with its own entry
//!    keeps it and every other known device inherits the `default` entry.
//!    The default node itself never appears in the output.
//!
//! Both steps are generic over the key and value so the same code resolves
//! upgrade pins, experiment headers and experiment package entries.

use crate::error::{Error, Result};
use crate::groups::{GroupDirectory, Node};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use tracing::debug;

/// How repeated assignments of the same (node, key) are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplicates {
    /// Identical values collapse; differing values conflict
    Collapse,
    /// Any second assignment conflicts, even with an identical value
    Reject,
}

/// Per-node assignments, keyed
pub type NodeAssignments<K, V> = BTreeMap<Node, BTreeMap<K, V>>;

/// Per-device resolved assignments, keyed
pub type DeviceAssignments<K, V> = BTreeMap<String, BTreeMap<K, V>>;

/// Expand (token, key, value) assignments into per-node assignments
pub fn expand_to_nodes<K, V, I>(
    groups: &GroupDirectory,
    assignments: I,
    duplicates: Duplicates,
) -> Result<NodeAssignments<K, V>>
where
    K: Ord + Clone + Debug,
    V: Eq + Clone + Debug,
    I: IntoIterator<Item = (String, K, V)>,
{
    let mut expanded: NodeAssignments<K, V> = BTreeMap::new();

    for (token, key, value) in assignments {
        for node in groups.resolve(&token).nodes() {
            let entries = expanded.entry(node.clone()).or_default();
            match entries.get(&key) {
                Some(existing) if duplicates == Duplicates::Collapse && *existing == value => {}
                Some(existing) => {
                    return Err(Error::ConflictingAssignment(format!(
                        "{} receives {:?} twice for {:?} (via '{}'; already {:?})",
                        node, value, key, token, existing
                    )));
                }
                None => {
                    entries.insert(key.clone(), value.clone());
                }
            }
        }
    }

    Ok(expanded)
}

/// Fill in default values for every device without an explicit entry
///
/// `universe` lists the devices that should receive defaults; devices with
/// explicit entries are always included.
pub fn normalize_default_map<K, V>(
    expanded: NodeAssignments<K, V>,
    universe: &BTreeSet<String>,
) -> DeviceAssignments<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    let mut expanded = expanded;
    let defaults = expanded.remove(&Node::Default).unwrap_or_default();

    let mut devices: BTreeSet<String> = universe.clone();
    devices.extend(expanded.keys().filter_map(|node| node.device().map(String::from)));

    let mut resolved = BTreeMap::new();
    for device in devices {
        let mut entries = defaults.clone();
        if let Some(explicit) = expanded.remove(&Node::Device(device.clone())) {
            entries.extend(explicit);
        }
        if !entries.is_empty() {
            resolved.insert(device, entries);
        }
    }

    debug!("Resolved assignments for {} devices", resolved.len());
    resolved
}

/// Every device known to the directory plus every device named by a token
pub fn device_universe<'a, I>(groups: &GroupDirectory, tokens: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut universe = groups.all_devices();
    for token in tokens {
        for node in groups.resolve(token).nodes() {
            if let Node::Device(device) = node {
                universe.insert(device);
            }
        }
    }
    universe
}

/// Expand then normalize in one step
pub fn resolve_assignments<K, V, I>(
    groups: &GroupDirectory,
    assignments: I,
    universe: &BTreeSet<String>,
    duplicates: Duplicates,
) -> Result<DeviceAssignments<K, V>>
where
    K: Ord + Clone + Debug,
    V: Eq + Clone + Debug,
    I: IntoIterator<Item = (String, K, V)>,
{
    let expanded = expand_to_nodes(groups, assignments, duplicates)?;
    Ok(normalize_default_map(expanded, universe))
}
