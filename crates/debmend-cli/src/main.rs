//! debmend CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use debmend_cli::{Cli, Commands, cmd};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            key_id,
            gnupg_home,
            suite,
        } => cmd::run::run(&cli, key_id.clone(), gnupg_home.clone(), suite.as_deref()).await,
        Commands::Check => cmd::check::check(&cli).await,
    }
}
