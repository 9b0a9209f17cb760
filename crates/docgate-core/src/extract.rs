//! Text and metadata extraction collaborator interface.

use std::path::Path;

use crate::document::{extension_of, Metadata};
use crate::error::ExtractError;

/// Result of one extraction call.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Extracted text, capped at the caller's character limit.
    pub text: Option<String>,
    /// Extracted metadata fields, in extractor order.
    pub metadata: Metadata,
}

/// Narrow interface to the text/metadata extraction engine.
///
/// Implementations are free to shell out, link a parser library or call a
/// sidecar service; the pipeline only sees these two operations.
pub trait TextExtractor: Send + Sync {
    /// Extract text (capped at `max_chars` characters when set) and metadata.
    fn extract(&self, path: &Path, max_chars: Option<usize>) -> Result<Extraction, ExtractError>;

    /// Extract metadata only, leaving the file content unread where possible.
    fn extract_metadata(&self, path: &Path) -> Result<Metadata, ExtractError>;
}

/// Minimal built-in extractor: reads files as (lossy) UTF-8 text and reports
/// basic filesystem metadata. Enough to run the daemon end-to-end without an
/// external extraction engine.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    fn base_metadata(&self, path: &Path) -> Result<Metadata, ExtractError> {
        let file_meta = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let mut meta = Metadata::new();
        meta.push("resourceName", name);
        meta.push("extension", extension_of(name));
        meta.push("Content-Length", file_meta.len().to_string());
        Ok(meta)
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path, max_chars: Option<usize>) -> Result<Extraction, ExtractError> {
        let metadata = self.base_metadata(path)?;
        let bytes = std::fs::read(path)?;
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if let Some(cap) = max_chars {
            if let Some((idx, _)) = text.char_indices().nth(cap) {
                text.truncate(idx);
            }
        }
        Ok(Extraction {
            text: Some(text),
            metadata,
        })
    }

    fn extract_metadata(&self, path: &Path) -> Result<Metadata, ExtractError> {
        self.base_metadata(path)
    }
}
