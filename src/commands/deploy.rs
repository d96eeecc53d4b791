// src/commands/deploy.rs
//! Whole-tree commands: constraint check and deployment

use super::Context;
use anyhow::{Context as _, Result};
use firmrel::deploy::{
    self, Confirm, DeployOptions, DeployTools, FixedAnswers, OpensslSigner, RsyncTransfer, Signer,
    Transfer,
};
use firmrel::packages::IpkParser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub fn cmd_check(ctx: &Context) -> Result<()> {
    ctx.tree.check_constraints().context("Constraint check failed")?;
    println!("All constraints hold");
    Ok(())
}

/// Asks the operator on stdin
struct PromptConfirm;

impl PromptConfirm {
    fn ask(question: &str) -> firmrel::Result<bool> {
        let mut stdout = io::stdout();
        write!(stdout, "{} [y/N] ", question)?;
        stdout.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

impl Confirm for PromptConfirm {
    fn confirm_copy(&mut self, destination: &str, changes: &str) -> firmrel::Result<bool> {
        let mut stdout = io::stdout();
        writeln!(stdout)?;
        if changes.trim().is_empty() {
            writeln!(stdout, "No changes for {}", destination)?;
        } else {
            writeln!(stdout, "Changes for {}:", destination)?;
            write!(stdout, "{}", changes)?;
        }
        writeln!(stdout)?;
        Self::ask(&format!("Copy to {}?", destination))
    }

    fn confirm_cleanup(&mut self, staging_root: &Path) -> firmrel::Result<bool> {
        Self::ask(&format!("Remove staging tree {}?", staging_root.display()))
    }
}

/// Validate, stage, and mirror the deployment tree
pub fn cmd_deploy(
    ctx: &Context,
    destination: Option<&str>,
    signing_key: Option<&Path>,
    yes: bool,
) -> Result<()> {
    let config = &ctx.config;
    let destination = destination
        .map(str::to_string)
        .or_else(|| config.deploy.destination.clone());
    let signing_key: Option<PathBuf> = signing_key
        .map(Path::to_path_buf)
        .or_else(|| config.deploy.signing_key.clone());

    let signer = signing_key
        .as_deref()
        .map(|key| OpensslSigner::new(key, &config.tools.openssl))
        .transpose()
        .context("Cannot sign package indices")?;

    let transfer = match &destination {
        Some(_) => Some(RsyncTransfer::new(&config.tools.rsync)?),
        None => None,
    };

    let mut options = DeployOptions {
        destination: destination.clone(),
        ..DeployOptions::default()
    };
    if let Some(dir) = &config.deploy.staging_dir {
        options.staging_parent = dir.clone();
    }

    let releases = ctx.tree.open_releases()?;
    let groups = ctx.tree.open_groups()?;
    let experiments = ctx.tree.open_experiments()?;
    let parser = IpkParser::new();
    let tools = DeployTools {
        parser: &parser,
        signer: signer.as_ref().map(|s| s as &dyn Signer),
        transfer: transfer.as_ref().map(|t| t as &dyn Transfer),
    };

    let mut fixed = FixedAnswers {
        copy: true,
        cleanup: false,
    };
    let mut prompt = PromptConfirm;
    let confirm: &mut dyn Confirm = if yes { &mut fixed } else { &mut prompt };

    info!("Deploying {} releases", releases.len());
    let report = deploy::deploy(&releases, &groups, &experiments, tools, &options, confirm)
        .context("Deployment failed")?;

    let stats = &report.stats;
    println!("Staged deployment in {}", report.staging_root.display());
    println!("  Devices: {}", stats.devices);
    println!("  Packages staged: {}", stats.packages_staged);
    println!("  Images staged: {}", stats.images_staged);
    println!("  Links created: {}", stats.links_created);
    println!("  Experiment files: {}", stats.experiment_files);
    println!("  Indices: {} ({} signed)", stats.indices_built, stats.signatures_created);

    match (&destination, report.copied) {
        (Some(destination), true) => println!("Deployed to {}", destination),
        (Some(destination), false) => println!("Not copied to {}", destination),
        (None, _) => println!("No destination configured; nothing copied"),
    }
    if report.staging_removed {
        println!("Removed staging tree");
    }
    Ok(())
}
