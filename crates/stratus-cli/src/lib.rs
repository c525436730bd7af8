//! Stratus CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stratus - static-website infrastructure convergence
#[derive(Parser, Debug)]
#[command(name = "stratus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the repository configuration file
    #[arg(long, global = true, default_value = "stratus.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full convergence apply over the domain catalog
    Deploy,
    /// Tear down every recorded resource (requires typed confirmation)
    Destroy(commands::destroy::DestroyArgs),
    /// Show recorded resources and published registry entries
    ListResources,
    /// Scaffold a new domain declaration
    CreateDomain(commands::create_domain::CreateDomainArgs),
    /// Check configuration, catalog, and backends without changing anything
    VerifyPrerequisites,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Deploy => commands::deploy::run(&self.config).await,
            Commands::Destroy(args) => commands::destroy::run(args, &self.config).await,
            Commands::ListResources => commands::list_resources::run(&self.config).await,
            Commands::CreateDomain(args) => commands::create_domain::run(args, &self.config),
            Commands::VerifyPrerequisites => commands::verify::run(&self.config).await,
        }
    }
}
