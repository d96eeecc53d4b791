// src/commands/group.rs
//! Device group commands

use super::{Context, print_table};
use anyhow::{Context as _, Result};
use firmrel::GroupDirectory;

fn open(ctx: &Context) -> Result<GroupDirectory> {
    ctx.tree.open_groups().context("Failed to open group directory")
}

/// List group names, or the members of one group
pub fn cmd_group_list(ctx: &Context, name: Option<&str>) -> Result<()> {
    let groups = open(ctx)?;
    match name {
        Some(name) => {
            for device in groups.members(name)? {
                println!("{}", device);
            }
        }
        None => {
            for name in groups.names() {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

pub fn cmd_group_list_all(ctx: &Context) -> Result<()> {
    let groups = open(ctx)?;
    let mut rows = Vec::new();
    for name in groups.names() {
        let members = groups.members(&name)?;
        rows.push(vec![
            name.clone(),
            members.len().to_string(),
            members.iter().cloned().collect::<Vec<_>>().join(" "),
        ]);
    }
    print_table(&["GROUP", "SIZE", "MEMBERS"], rows);
    Ok(())
}

pub fn cmd_group_new(ctx: &Context, name: &str, devices: &[String]) -> Result<()> {
    let mut groups = open(ctx)?;
    groups.new_group(name)?;
    for device in devices {
        groups.add_member(name, device)?;
    }
    groups.save()?;
    println!("Created group {} ({} members)", name, devices.len());
    Ok(())
}

pub fn cmd_group_copy(ctx: &Context, name: &str, new_name: &str) -> Result<()> {
    let mut groups = open(ctx)?;
    groups.copy_group(name, new_name)?;
    groups.save()?;
    println!("Copied group {} to {}", name, new_name);
    Ok(())
}

pub fn cmd_group_delete(ctx: &Context, name: &str) -> Result<()> {
    let mut groups = open(ctx)?;
    groups.delete_group(name)?;
    groups.save()?;
    println!("Deleted group {}", name);
    Ok(())
}

pub fn cmd_group_add(ctx: &Context, group: &str, devices: &[String]) -> Result<()> {
    let mut groups = open(ctx)?;
    for device in devices {
        groups.add_member(group, device)?;
    }
    groups.save()?;
    println!("Added {} devices to {}", devices.len(), group);
    Ok(())
}

pub fn cmd_group_remove(ctx: &Context, group: &str, devices: &[String]) -> Result<()> {
    let mut groups = open(ctx)?;
    for device in devices {
        groups.remove_member(group, device)?;
    }
    groups.save()?;
    println!("Removed {} devices from {}", devices.len(), group);
    Ok(())
}
