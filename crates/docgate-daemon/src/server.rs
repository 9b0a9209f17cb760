//! TCP acceptor for the docgate daemon.
//!
//! Accepts connections and spawns one independent worker per connection.
//! Workers share only the activation snapshot cell and the conversion engine
//! pool; everything else is per-connection.

use crate::config::Config;
use crate::connection::handle_connection;
use anyhow::{Context, Result};
use docgate_core::{
    ActivationCell, ConversionRouter, DocumentProcessor, DocumentStore, TextExtractor,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state handed to every connection worker.
pub struct ServerState {
    pub activation: ActivationCell,
    pub router: Arc<ConversionRouter>,
    pub processor: DocumentProcessor,
    /// Root under which per-connection scratch directories are created.
    pub work_dir: PathBuf,
}

impl ServerState {
    /// Build the shared state: wipe and recreate the scratch root, then stand
    /// up the conversion engine pool inside it.
    pub fn new(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        let work_dir = config.work_dir();
        if work_dir.exists() {
            std::fs::remove_dir_all(&work_dir)
                .with_context(|| format!("Failed to clear work dir {}", work_dir.display()))?;
        }
        std::fs::create_dir_all(&work_dir)
            .with_context(|| format!("Failed to create work dir {}", work_dir.display()))?;
        tracing::info!("Scratch root ready at {}", work_dir.display());

        let profile_root = work_dir.join("office-profiles");
        let router = Arc::new(
            ConversionRouter::new(&config.converter(), &profile_root)
                .context("Failed to set up conversion engines")?,
        );
        let processor = DocumentProcessor::new(store, extractor, Arc::clone(&router));

        Ok(Self {
            activation: ActivationCell::new(),
            router,
            processor,
            work_dir,
        })
    }
}

/// TCP server accepting one connection per request cycle.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Server {
    /// Bind the listening socket. Port 0 picks an ephemeral port.
    pub async fn bind(host: &str, port: u16, state: Arc<ServerState>) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .with_context(|| format!("Failed to bind {host}:{port}"))?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop. Never returns under normal operation.
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Server ready, accepting connections");
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!("Accepted connection from {addr}");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        handle_connection(stream, state).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {e}");
                }
            }
        }
    }
}
