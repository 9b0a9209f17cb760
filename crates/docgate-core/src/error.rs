//! Error types for document processing operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from the conversion engines and the routing layer.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The requested target extension is outside the supported set.
    #[error("unsupported target extension: {0}")]
    UnsupportedTarget(String),

    /// The engine needed for this conversion has no command/binary configured.
    #[error("conversion engine not configured: {0}")]
    EngineNotConfigured(&'static str),

    /// The engine process ran but reported failure.
    #[error("conversion engine failed: {0}")]
    EngineFailed(String),

    /// The engine process exceeded the configured timeout and was killed.
    #[error("conversion timed out after {0:?}")]
    Timeout(Duration),

    /// The engine reported success but the output artifact is missing.
    #[error("converted artifact missing: {0}")]
    MissingArtifact(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the text/metadata extraction collaborator.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extraction failed: {0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the document load/save collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document store failure: {0}")]
    Failed(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
