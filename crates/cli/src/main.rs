//! Feedback CLI - submit customer feedback to the Foodzo backend

mod commands;
mod config;
mod logging;
mod state_dir;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use commands::Commands;
use feedback_client::{ApiClient, FileStore, TokenStore};
use state_dir::StateDir;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "feedback")]
#[command(about = "Submit customer feedback to the Foodzo backend")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Directory for config, tokens and logs
    #[arg(short = 'd', long, global = true, env = "FEEDBACK_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Override the backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Timeout for the whole command in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "0")]
    timeout: u64,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let state_dir = StateDir::resolve(cli.state_dir.clone());
    let log_file = (!cli.no_file_log).then(|| state_dir.log_path());
    logging::init_logging(cli.log_level.clone().into(), log_file.as_deref())?;

    let api = build_client(&cli, &state_dir)?;

    let outcome = if cli.timeout == 0 {
        cli.command.execute(api).await
    } else {
        let timeout_duration = Duration::from_secs(cli.timeout);
        tokio::time::timeout(timeout_duration, cli.command.execute(api))
            .await
            .unwrap_or_else(|_| {
                Err(anyhow::anyhow!(
                    "Command timed out after {} seconds",
                    cli.timeout
                ))
            })
    };

    if let Err(e) = outcome {
        error!("Command failed: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

fn build_client(cli: &Cli, state_dir: &StateDir) -> Result<ApiClient> {
    let mut client_config =
        config::load_client_config(cli.config.as_deref(), &state_dir.config_path())?;
    if let Some(base_url) = &cli.base_url {
        client_config.base_url.clone_from(base_url);
    }

    let token_path = client_config.state_dir.as_ref().map_or_else(
        || state_dir.token_store_path(),
        |dir| StateDir::with_override(dir).token_store_path(),
    );
    info!("Using token store at {}", token_path.display());
    let store = TokenStore::new(Arc::new(FileStore::new(token_path)));

    ApiClient::from_config(&client_config, store).context("Failed to create API client")
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
