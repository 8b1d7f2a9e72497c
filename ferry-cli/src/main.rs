//! Ferry CLI - Command-line interface
//!
//! Runs a tracker or acts as a peer: splitting, advertising, downloading and
//! serving chunks.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use ferry_core::FerryError;
use ferry_core::config::FerryConfig;
use ferry_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Chunked peer-to-peer file distribution")]
struct Cli {
    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace log (overrides FERRY_LOGS_DIR)
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = FerryConfig::from_env();
    if let Some(dir) = cli.logs_dir {
        config.logging.logs_dir = dir;
    }
    init_tracing(
        cli.log_level.as_tracing_level(),
        &config.logging,
        &cli.command.log_role(),
    )?;

    if let Err(error) = commands::handle_command(cli.command, config).await {
        match error.downcast_ref::<FerryError>() {
            Some(ferry_error) => {
                tracing::debug!("Command failed: {:?}", ferry_error);
                eprintln!("Error: {}", ferry_error.user_message());
                eprintln!("  caused by: {ferry_error}");
            }
            None => eprintln!("Error: {error:#}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
