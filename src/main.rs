// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use firmrel::Flag;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, ExperimentCommands, FlagArgs, GroupCommands, ReleaseCommands};
use commands::Context;

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(fallback)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "firmrel", &mut std::io::stdout());
        return Ok(());
    }

    let ctx = Context::from_args(&cli.global)?;
    let set_flag = |args: FlagArgs, flag: Flag, value: bool| {
        commands::cmd_experiment_flag(&ctx, &args.experiment, flag, value, &args.groups)
    };

    match cli.command {
        Commands::Release(command) => match command {
            ReleaseCommands::New { name, build_root } => {
                commands::cmd_release_new(&ctx, &name, &build_root)
            }
            ReleaseCommands::List => commands::cmd_release_list(&ctx),
            ReleaseCommands::Architectures { release } => {
                commands::cmd_release_architectures(&ctx, &release)
            }
            ReleaseCommands::Packages { release } => {
                commands::cmd_release_packages(&ctx, release.as_deref())
            }
            ReleaseCommands::Builtins {
                release,
                architecture,
            } => commands::cmd_release_builtins(&ctx, release.as_deref(), architecture.as_deref()),
            ReleaseCommands::Extras {
                release,
                architecture,
            } => commands::cmd_release_extras(&ctx, release.as_deref(), architecture.as_deref()),
            ReleaseCommands::AddPackages { release, locations } => {
                commands::cmd_release_add_packages(&ctx, &release, &locations)
            }
            ReleaseCommands::AddExtra {
                release,
                name,
                version,
                architecture,
            } => commands::cmd_release_add_extra(&ctx, &release, &name, &version, &architecture),
            ReleaseCommands::RemoveExtra {
                release,
                name,
                version,
                architecture,
            } => commands::cmd_release_remove_extra(&ctx, &release, &name, &version, &architecture),
            ReleaseCommands::Upgrade {
                release,
                name,
                version,
                architecture,
                groups,
            } => commands::cmd_release_upgrade(
                &ctx,
                &release,
                &name,
                &version,
                &architecture,
                &groups,
            ),
            ReleaseCommands::Upgrades { release } => {
                commands::cmd_release_upgrades(&ctx, release.as_deref())
            }
        },

        Commands::Group(command) => match command {
            GroupCommands::List { name } => commands::cmd_group_list(&ctx, name.as_deref()),
            GroupCommands::ListAll => commands::cmd_group_list_all(&ctx),
            GroupCommands::New { name, devices } => commands::cmd_group_new(&ctx, &name, &devices),
            GroupCommands::Copy { name, new_name } => {
                commands::cmd_group_copy(&ctx, &name, &new_name)
            }
            GroupCommands::Delete { name } => commands::cmd_group_delete(&ctx, &name),
            GroupCommands::Add { group, devices } => {
                commands::cmd_group_add(&ctx, &group, &devices)
            }
            GroupCommands::Remove { group, devices } => {
                commands::cmd_group_remove(&ctx, &group, &devices)
            }
        },

        Commands::Experiment(command) => match command {
            ExperimentCommands::New {
                name,
                display_name,
                description,
            } => commands::cmd_experiment_new(&ctx, &name, &display_name, &description),
            ExperimentCommands::List { name } => {
                commands::cmd_experiment_list(&ctx, name.as_deref())
            }
            ExperimentCommands::ListAll => commands::cmd_experiment_list_all(&ctx),
            ExperimentCommands::Packages { name } => {
                commands::cmd_experiment_packages(&ctx, &name)
            }
            ExperimentCommands::AddPackage(args) => {
                commands::cmd_experiment_add_package(&ctx, &args.experiment, args.package())
            }
            ExperimentCommands::RemovePackage(args) => {
                commands::cmd_experiment_remove_package(&ctx, &args.experiment, &args.package())
            }
            ExperimentCommands::AddConflict { experiment, other } => {
                commands::cmd_experiment_add_conflict(&ctx, &experiment, &other)
            }
            ExperimentCommands::RemoveConflict { experiment, other } => {
                commands::cmd_experiment_remove_conflict(&ctx, &experiment, &other)
            }
            ExperimentCommands::Require(args) => set_flag(args, Flag::Required, true),
            ExperimentCommands::Unrequire(args) => set_flag(args, Flag::Required, false),
            ExperimentCommands::Revoke(args) => set_flag(args, Flag::Revoked, true),
            ExperimentCommands::Unrevoke(args) => set_flag(args, Flag::Revoked, false),
            ExperimentCommands::InstallByDefault(args) => {
                set_flag(args, Flag::InstalledByDefault, true)
            }
            ExperimentCommands::UninstallByDefault(args) => {
                set_flag(args, Flag::InstalledByDefault, false)
            }
        },

        Commands::Check => commands::cmd_check(&ctx),

        Commands::Deploy {
            destination,
            signing_key,
            yes,
        } => commands::cmd_deploy(&ctx, destination.as_deref(), signing_key.as_deref(), yes),

        Commands::Completions { .. } => Ok(()),
    }
}
