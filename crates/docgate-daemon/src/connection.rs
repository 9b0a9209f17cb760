//! Per-connection worker.
//!
//! Each accepted connection is owned end-to-end by one worker: handshake,
//! command dispatch, scratch-directory lifecycle, response, teardown. The
//! worker is generic over the stream so the state machine can be driven over
//! an in-memory duplex in tests.

use crate::protocol::{self, Header};
use crate::server::ServerState;
use anyhow::Result;
use docgate_core::{ActivationParams, ProcessRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    Worker::new(stream, state).run().await;
}

pub(crate) struct Worker<S> {
    stream: S,
    state: Arc<ServerState>,
    conn_id: String,
    scratch: Option<PathBuf>,
}

impl<S> Worker<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S, state: Arc<ServerState>) -> Self {
        Self {
            stream,
            state,
            conn_id: Uuid::new_v4().to_string(),
            scratch: None,
        }
    }

    pub(crate) async fn run(mut self) {
        if let Err(err) = self.serve().await {
            warn!(conn = %self.conn_id, %err, "connection failed");
            // Best effort; the peer may already be gone.
            let _ = protocol::send_header(&mut self.stream, Header::Error).await;
        }
        self.teardown().await;
    }

    async fn serve(&mut self) -> Result<()> {
        let header = protocol::receive_header(&mut self.stream).await?;
        match header {
            Header::Alive => self.handle_alive().await,
            Header::Init => self.handle_init().await,
            other => {
                warn!(conn = %self.conn_id, ?other, "unexpected opening header");
                protocol::send_header(&mut self.stream, Header::Error).await?;
                Ok(())
            }
        }
    }

    /// Liveness probe, doubling as the remote configuration path while the
    /// activation snapshot is unset.
    async fn handle_alive(&mut self) -> Result<()> {
        if self.state.activation.is_configured() {
            protocol::send_header(&mut self.stream, Header::Ack).await?;
            return Ok(());
        }

        protocol::send_header(&mut self.stream, Header::NeedsConfig).await?;
        let descriptor = protocol::receive_string(&mut self.stream).await?;
        let header = protocol::receive_header(&mut self.stream).await?;
        if header != Header::Config {
            warn!(conn = %self.conn_id, ?header, "expected CONFIG after descriptor");
            protocol::send_header(&mut self.stream, Header::Error).await?;
            return Ok(());
        }

        match ActivationParams::from_json(&descriptor) {
            Ok(params) => {
                self.state.activation.install(params);
                info!(conn = %self.conn_id, "activation parameters installed");
                protocol::send_header(&mut self.stream, Header::Ack).await?;
            }
            Err(err) => {
                warn!(conn = %self.conn_id, %err, "rejecting activation descriptor");
                protocol::send_header(&mut self.stream, Header::Error).await?;
            }
        }
        Ok(())
    }

    async fn handle_init(&mut self) -> Result<()> {
        protocol::send_header(&mut self.stream, Header::Ack).await?;

        let command = protocol::receive_header(&mut self.stream).await?;
        if !matches!(
            command,
            Header::ProcessDocument | Header::Convert | Header::Compare
        ) {
            warn!(conn = %self.conn_id, ?command, "unexpected command header");
            protocol::send_header(&mut self.stream, Header::Error).await?;
            return Ok(());
        }

        // Private scratch space, allocated before any payload arrives.
        let scratch = self.state.work_dir.join(&self.conn_id);
        tokio::fs::create_dir_all(&scratch).await?;
        self.scratch = Some(scratch.clone());
        protocol::send_header(&mut self.stream, Header::Ack).await?;

        match command {
            Header::ProcessDocument => self.handle_process_document(&scratch).await,
            Header::Convert => self.handle_convert(&scratch).await,
            Header::Compare => self.handle_compare(&scratch).await,
            _ => unreachable!("filtered above"),
        }
    }

    async fn handle_process_document(&mut self, scratch: &Path) -> Result<()> {
        let doc_id = protocol::receive_string(&mut self.stream).await?;
        let targets_csv = protocol::receive_string(&mut self.stream).await?;
        let additional = protocol::receive_string(&mut self.stream).await?;

        let Some(params) = self.state.activation.snapshot() else {
            warn!(conn = %self.conn_id, "document command before configuration");
            protocol::send_header(&mut self.stream, Header::Error).await?;
            return Ok(());
        };

        let targets: Vec<String> = targets_csv
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let request = ProcessRequest {
            doc_id: doc_id.clone(),
            targets,
            content: (!additional.is_empty()).then(|| serde_json::Value::String(additional)),
            scratch: scratch.to_path_buf(),
        };

        match self.state.processor.process(&params, request).await {
            Ok(true) => protocol::send_header(&mut self.stream, Header::Done).await?,
            Ok(false) => {
                info!(conn = %self.conn_id, doc_id, "document was not persisted");
                protocol::send_header(&mut self.stream, Header::Error).await?;
            }
            Err(err) => {
                warn!(conn = %self.conn_id, doc_id, %err, "document processing failed");
                protocol::send_header(&mut self.stream, Header::Error).await?;
            }
        }
        Ok(())
    }

    async fn handle_convert(&mut self, scratch: &Path) -> Result<()> {
        let bytes = protocol::receive_payload(&mut self.stream).await?;
        let from_ext = normalize_ext(&protocol::receive_string(&mut self.stream).await?);
        let to_ext = normalize_ext(&protocol::receive_string(&mut self.stream).await?);

        let input = scratch.join(input_name("input", &from_ext));
        tokio::fs::write(&input, &bytes).await?;

        match self
            .state
            .router
            .convert(&input, &from_ext, &to_ext, scratch)
            .await
        {
            Ok(artifact) => {
                let out = tokio::fs::read(&artifact).await?;
                protocol::send_header(&mut self.stream, Header::Done).await?;
                protocol::send_payload(&mut self.stream, &out).await?;
            }
            Err(err) => {
                warn!(conn = %self.conn_id, from_ext, to_ext, %err, "conversion failed");
                protocol::send_header(&mut self.stream, Header::Error).await?;
            }
        }
        Ok(())
    }

    async fn handle_compare(&mut self, scratch: &Path) -> Result<()> {
        let prev_bytes = protocol::receive_payload(&mut self.stream).await?;
        let prev_ext = normalize_ext(&protocol::receive_string(&mut self.stream).await?);
        let next_bytes = protocol::receive_payload(&mut self.stream).await?;
        let next_ext = normalize_ext(&protocol::receive_string(&mut self.stream).await?);
        let format_flag = protocol::receive_string(&mut self.stream).await?;

        // Requested pdf output, otherwise the first version's own format.
        let out_ext = if format_flag.trim().eq_ignore_ascii_case("pdf") {
            "pdf".to_string()
        } else {
            prev_ext.clone()
        };

        let prev = scratch.join(input_name("prev", &prev_ext));
        let next = scratch.join(input_name("next", &next_ext));
        tokio::fs::write(&prev, &prev_bytes).await?;
        tokio::fs::write(&next, &next_bytes).await?;

        match self
            .state
            .router
            .office()
            .compare(&prev, &next, &out_ext, scratch)
            .await
        {
            Ok(artifact) => {
                let out = tokio::fs::read(&artifact).await?;
                protocol::send_header(&mut self.stream, Header::Done).await?;
                protocol::send_string(&mut self.stream, &out_ext).await?;
                protocol::send_payload(&mut self.stream, &out).await?;
            }
            Err(err) => {
                warn!(conn = %self.conn_id, %err, "comparison failed");
                protocol::send_header(&mut self.stream, Header::Error).await?;
            }
        }
        Ok(())
    }

    /// Best-effort cleanup; each action runs even if an earlier one fails.
    async fn teardown(mut self) {
        if let Err(err) = self.stream.shutdown().await {
            debug!(conn = %self.conn_id, %err, "stream shutdown failed");
        }
        if let Some(scratch) = self.scratch.take() {
            if let Err(err) = tokio::fs::remove_dir_all(&scratch).await {
                warn!(conn = %self.conn_id, %err, "scratch cleanup failed");
            }
        }
        debug!(conn = %self.conn_id, "connection closed");
    }
}

fn normalize_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

fn input_name(stem: &str, ext: &str) -> String {
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{ext}")
    }
}
