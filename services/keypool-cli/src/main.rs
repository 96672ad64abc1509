//! keypool
//!
//! Operator command surface for the rotating API key pool:
//! 1. Resolves configuration (optional TOML file, env overrides)
//! 2. Loads the pool snapshot
//! 3. Runs one command: add, remove, list, status or switch

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use key_pool::CredentialStore;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{Command, Outcome};
use crate::config::Config;

/// Exit code for rejected operator input.
const EXIT_INVALID_INPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "keypool", about = "Manage API keys for auto-switching", version)]
struct Cli {
    /// Config file path (overrides KEYPOOL_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pool snapshot path (overrides KEYPOOL_STATE_PATH and the config file)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    debug!(command = cli.command.name(), "starting keypool");

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_or_default(config_path.as_deref()).with_context(|| {
        format!(
            "failed to load config from {}",
            config_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        )
    })?;

    let state_path = config
        .state_path(cli.state.as_deref())
        .context("failed to resolve pool snapshot path")?;
    info!(path = %state_path.display(), "using pool snapshot");

    let store = Arc::new(CredentialStore::load(state_path).await);

    let mut stdout = std::io::stdout();
    match commands::run(cli.command, store, config.rotation, &mut stdout).await? {
        Outcome::Done => Ok(ExitCode::SUCCESS),
        Outcome::Rejected(message) => {
            eprintln!("{message}");
            Ok(ExitCode::from(EXIT_INVALID_INPUT))
        }
    }
}
