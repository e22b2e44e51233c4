use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use gator::commands::{self, AppContext, Command, Outcome};
use gator::config::Config;
use gator::storage::{Database, DatabaseError};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Multi-user RSS aggregator")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Cancel `token` on the first SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
            token.cancel();
        });
    }
    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    Ok(())
}

async fn run(args: Args) -> Result<Outcome> {
    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let db_path = config.database_path(config_path.parent().unwrap_or(config_dir.as_path()));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database at {} is locked by another process.", db_path.display());
            return Ok(Outcome::Exit(1));
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    let mut ctx = AppContext {
        db,
        config,
        config_path,
        cancel,
    };
    let mut stdout = std::io::stdout();
    commands::execute(args.command, &mut ctx, &mut stdout).await
}

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG wins; otherwise info, so `agg` reports every cycle
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(Outcome::Completed) => {
            println!("Command executed successfully");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Exit(code)) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error executing command: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
