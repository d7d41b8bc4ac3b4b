pub mod cleanup;
pub mod config;
pub mod doctor;
pub mod list;
pub mod restore;

use clap::{Parser, Subcommand};
use common::cli::CommonArgs;
use common::cli::utils::{init_logging, load_config};
use std::process::ExitCode;

/// dbvault: backup retention and disaster recovery for a database
#[derive(Parser)]
#[command(name = "dbvault", version, about)]
pub struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete backups that have outlived their retention window
    Cleanup(cleanup::CleanupArgs),
    /// Restore the database from a backup
    Restore(restore::RestoreArgs),
    /// List cataloged backups with statistics
    List(list::ListArgs),
    /// Check configuration, catalog and restore tool
    Doctor,
    /// Show the effective configuration with secrets masked
    Config(config::ConfigArgs),
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        init_logging(&self.common);
        let config = load_config(self.common.config.as_ref())?;

        match self.command {
            Commands::Cleanup(args) => args.run(&config).await,
            Commands::Restore(args) => args.run(&config).await,
            Commands::List(args) => args.run(&config).await,
            Commands::Doctor => doctor::run(&config).await,
            Commands::Config(args) => args.run(&config),
        }
    }
}
