//! roost-agentd: runs either side of roost.
//!
//! ```text
//! roost-agentd master  --config /etc/roost/master.toml
//! roost-agentd spawner --config /etc/roost/spawner.toml
//! ```

mod config;
mod master;
mod spawner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use roost_observe::{LoggerConfig, logger_init};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "roost-agentd", about = "roost spawn orchestration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator and its HTTP API.
    Master {
        /// TOML configuration file; built-in defaults when omitted.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Run a worker that launches processes for a master.
    Spawner {
        /// TOML configuration file; built-in defaults when omitted.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Master { config } => {
            let file = match config {
                Some(path) => config::load(&path)?,
                None => config::MasterFile::default(),
            };
            init_logger(&file.logger)?;
            master::run(file, shutdown_token()).await
        }
        Command::Spawner { config } => {
            let file = match config {
                Some(path) => config::load(&path)?,
                None => config::SpawnerFile::default(),
            };
            init_logger(&file.logger)?;
            spawner::run(file, shutdown_token()).await
        }
    }
}

fn init_logger(cfg: &LoggerConfig) -> anyhow::Result<()> {
    logger_init(cfg)?;
    info!(format = %cfg.format, level = %cfg.level, "logger initialized");
    Ok(())
}

/// Cancelled on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        trigger.cancel();
    });
    token
}
