mod audit;
mod cli;
mod config;
mod dispatch;
mod execution;
mod http;
mod logging;
mod metrics;
mod secrets;
mod types;

use clap::Parser;
use tracing::{error, info};

use crate::cli::{Cli, Commands, RunArgs};
use crate::types::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli
        .command
        .clone()
        .unwrap_or(Commands::Run(RunArgs::default()));

    // Version output needs no configuration
    let loaded = match command {
        Commands::Version => None,
        _ => Some(cli.load_config()),
    };

    crate::logging::init(
        cli.log_level_override(),
        cli.log_format_override(),
        loaded.as_ref().and_then(|result| result.as_ref().ok()),
    )?;

    crate::metrics::init_metrics();

    let config = match loaded {
        None => return cli::show_version().await,
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            error!(error = %e, "Failed to load configuration");
            return Err(e);
        }
    };

    info!("Starting deployhook");

    match command {
        Commands::Run(_) => cli::run_server(config).await,
        Commands::Validate => cli::validate_config(config).await,
        Commands::Version => cli::show_version().await,
    }
}
