mod check;
mod migrate;
mod run;

pub use check::CheckCommand;
pub use migrate::MigrateCommand;
pub use run::RunCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};

use arx_core::config::SupervisorConfig;

/// ARX - fleet supervisor and request router
#[derive(Parser)]
#[command(name = "arx-supervisor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the supervisor.
    Run(RunCommand),

    /// Validate a configuration file and print the effective settings.
    Check(CheckCommand),

    /// Create the persistence schema.
    Migrate(MigrateCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::Check(cmd) => cmd.execute(),
            Commands::Migrate(cmd) => cmd.execute().await,
        }
    }
}

/// Load `path`, or fall back to defaults when the file does not exist.
///
/// A file that exists but fails to parse or validate is an error.
pub(crate) fn load_config(path: &str) -> Result<(SupervisorConfig, bool)> {
    let config_path = std::path::Path::new(path);
    if !config_path.exists() {
        return Ok((SupervisorConfig::default(), false));
    }
    let config = SupervisorConfig::from_file(config_path)
        .map_err(|e| anyhow::anyhow!("{}: {}", path, e))?;
    Ok((config, true))
}
