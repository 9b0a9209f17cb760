//! docgate-daemon: network gateway for document indexing, conversion and
//! comparison.

use anyhow::{Context, Result};
use clap::Parser;
use docgate_core::{FsDocumentStore, PlainTextExtractor};
use docgate_daemon::config::{load_config, Config};
use docgate_daemon::server::{Server, ServerState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docgate-daemon")]
#[command(about = "docgate daemon - document processing gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listening address (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Listening port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Scratch root directory (overrides config)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Document spool directory (overrides config)
    #[arg(long)]
    storage_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let host = args.host.unwrap_or_else(|| config.host());
    let port = args.port.unwrap_or_else(|| config.port());
    let storage_root = args
        .storage_root
        .clone()
        .unwrap_or_else(|| config.storage_root());
    let config = override_work_dir(config, args.work_dir);

    std::fs::create_dir_all(&storage_root)
        .with_context(|| format!("Failed to create spool {}", storage_root.display()))?;
    tracing::info!("Serving documents from {}", storage_root.display());

    let state = Arc::new(ServerState::new(
        &config,
        Arc::new(FsDocumentStore::new(storage_root)),
        Arc::new(PlainTextExtractor),
    )?);
    let server = Server::bind(&host, port, state).await?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, shutting down");
        }
    }

    tracing::info!("docgate-daemon stopped");
    Ok(())
}

fn override_work_dir(mut config: Config, work_dir: Option<PathBuf>) -> Config {
    if let Some(dir) = work_dir {
        config.daemon.get_or_insert_with(Default::default).work_dir = Some(dir);
    }
    config
}
