mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Encore -- automated seat-reservation session driver.
#[derive(Parser, Debug)]
#[command(name = "encore", version, about)]
struct Cli {
    /// Path to the session configuration file
    #[arg(long, default_value = "encore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a reservation session against the configured performance
    Run,

    /// Open the login form, wait for a manual login, and persist the
    /// cookie jar for later runs
    Login,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = encore_types::SessionConfig::load(&cli.config).map_err(|e| {
        anyhow::anyhow!("failed to load config {}: {e}", cli.config.display())
    })?;

    match cli.command {
        Commands::Run => commands::run(&config).await,
        Commands::Login => commands::login(&config).await,
    }
}
