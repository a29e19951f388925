//! Multicam: live color/depth grid for several cameras over shared memory

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use multicam::{app, Config};

#[derive(Debug, Parser)]
#[command(name = "multicam", version, about)]
struct Cli {
    /// TOML configuration file; `MULTICAM__*` environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show all configured cameras in one window (default)
    View {
        /// Render without a window
        #[arg(long)]
        headless: bool,
    },
    /// Capture one camera and stream framesets to stdout
    #[command(hide = true)]
    Produce {
        #[arg(long)]
        alias: String,
    },
    /// List V4L2 capture devices
    ListDevices,
}

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("multicam=info"));
    // stdout carries framesets between processes, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::View { headless: false }) {
        Command::View { headless } => {
            info!("Multicam Launching...");
            config.viewer.headless |= headless;
            let exit = app::run_viewer(&config, cli.config.as_deref())?;
            info!("Multicam shutting down ({:?})", exit);
        }
        Command::Produce { alias } => app::run_producer(&config, &alias)?,
        Command::ListDevices => app::list_devices(),
    }
    Ok(())
}
