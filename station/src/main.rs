//! AgroSmart - Entry Point
//!
//! `agrosmart server` runs the irrigation scheduler, telemetry ingest and the
//! HTTP command gateway. `agrosmart device` runs the valve controller on a
//! field station.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use agrosmart::app::options::{DeviceModeOptions, ServerModeOptions};
use agrosmart::app::run::{run_device, run_server};
use agrosmart::filesys::file::File;
use agrosmart::logs::{init_logging, LogOptions};
use agrosmart::storage::layout::StorageLayout;
use agrosmart::storage::settings::Settings;
use agrosmart::utils::version_info;

#[derive(Debug, Parser)]
#[command(name = "agrosmart", version, about = "AgroSmart irrigation scheduling and valve control")]
struct Cli {
    /// Settings file; defaults to settings.json under the storage directory
    #[arg(long, global = true, env = "AGROSMART_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scheduler loop, telemetry ingest and HTTP gateway
    Server,
    /// Valve controller for one field device
    Device,
    /// Print build information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("agrosmart: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if matches!(cli.command, Command::Version) {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(());
    }

    let settings_file = match &cli.config {
        Some(path) => File::new(path.clone()),
        None => StorageLayout::default().settings_file(),
    };
    let settings = Settings::load(&settings_file).await?;

    let _log_guard = init_logging(LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_dir.clone(),
    })
    .context("Failed to initialize logging")?;

    let version = version_info();
    info!(version = %version.version, git_hash = %version.git_hash, "Starting AgroSmart");

    match cli.command {
        Command::Server => {
            let options = ServerModeOptions::from_settings(&settings)?;
            info!("Running server with options: {:?}", options);
            run_server(options, await_shutdown_signal()).await?;
        }
        Command::Device => {
            let options = DeviceModeOptions::from_settings(&settings)?;
            info!("Running device with options: {:?}", options);
            run_device(options, await_shutdown_signal()).await?;
        }
        Command::Version => {}
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
