//! Conversion engines and routing.
//!
//! Two paths produce PDF artifacts: a command-template image converter
//! (ImageMagick-style) for raster formats, and a headless office engine for
//! everything else. The router owns the closed set of supported target
//! formats and picks the path from the source extension.

mod image;
mod office;

pub use image::ImageConverter;
pub use office::OfficeEngine;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ConvertError;

/// Closed set of supported terminal conversion formats. Requests for anything
/// else fail closed at dispatch entry.
pub const SUPPORTED_TARGETS: &[&str] = &["pdf"];

/// Default extensions handled by the image conversion path.
const IMAGE_EXTENSIONS_DEFAULT: &[&str] = &["tiff", "tif", "png", "jpeg", "jpg", "bmp", "gif"];

/// Static configuration for the conversion engines.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Per-conversion timeout in milliseconds; 0 = no timeout.
    pub timeout_ms: u64,
    /// Image conversion command template with `%SOURCE_FILE%` and
    /// `%DEST_FILE%` placeholders. Unset = image path not configured.
    pub image_command: Option<String>,
    /// Extensions routed to the image path.
    pub image_extensions: Vec<String>,
    /// Office engine binary.
    pub soffice: String,
    /// Number of office engine processes allowed to run concurrently.
    pub office_instances: usize,
    /// Produce PDF/A instead of plain PDF on the office path.
    pub pdfa: bool,
    /// Document comparison command template with `%PREV_FILE%`,
    /// `%NEXT_FILE%` and `%DEST_FILE%` placeholders.
    pub compare_command: Option<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            image_command: None,
            image_extensions: IMAGE_EXTENSIONS_DEFAULT
                .iter()
                .map(|s| s.to_string())
                .collect(),
            soffice: "soffice".to_string(),
            office_instances: 2,
            pdfa: false,
            compare_command: None,
        }
    }
}

impl ConverterConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Routes one source/target extension pair to the right engine.
pub struct ConversionRouter {
    image: ImageConverter,
    office: Arc<OfficeEngine>,
    image_extensions: Vec<String>,
}

impl ConversionRouter {
    /// Build the router and its engines. `profile_root` hosts the office
    /// engine's per-slot profile directories.
    pub fn new(config: &ConverterConfig, profile_root: &Path) -> std::io::Result<Self> {
        Ok(Self {
            image: ImageConverter::new(config.image_command.clone(), config.timeout()),
            office: Arc::new(OfficeEngine::new(config, profile_root)?),
            image_extensions: config.image_extensions.clone(),
        })
    }

    pub fn is_supported_target(ext: &str) -> bool {
        SUPPORTED_TARGETS.iter().any(|t| t.eq_ignore_ascii_case(ext))
    }

    /// Shared office engine, also used directly by the comparison command.
    pub fn office(&self) -> Arc<OfficeEngine> {
        Arc::clone(&self.office)
    }

    fn is_image_extension(&self, ext: &str) -> bool {
        self.image_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Convert `input` from `from_ext` to `to_ext`, writing the artifact into
    /// `scratch`. A same-extension request is a pass-through: the input file
    /// itself is the artifact and no engine runs.
    pub async fn convert(
        &self,
        input: &Path,
        from_ext: &str,
        to_ext: &str,
        scratch: &Path,
    ) -> Result<PathBuf, ConvertError> {
        if from_ext.eq_ignore_ascii_case(to_ext) {
            debug!(input = %input.display(), ext = from_ext, "same-extension conversion, pass-through");
            return Ok(input.to_path_buf());
        }
        if !Self::is_supported_target(to_ext) {
            return Err(ConvertError::UnsupportedTarget(to_ext.to_string()));
        }

        if self.is_image_extension(from_ext) {
            self.image.convert(input, scratch).await
        } else {
            self.office.convert_to_pdf(input, scratch).await
        }
    }
}

/// Run an engine subprocess, killing it when the timeout elapses.
pub(crate) async fn run_engine(
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> Result<std::process::ExitStatus, ConvertError> {
    let mut child = cmd
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(?limit, "engine process exceeded timeout, killing it");
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(ConvertError::Timeout(limit));
            }
        },
        None => child.wait().await?,
    };
    Ok(status)
}

/// Expand a command template into argv, substituting placeholder tokens.
pub(crate) fn expand_template(template: &str, substitutions: &[(&str, &Path)]) -> Vec<String> {
    template
        .split_whitespace()
        .map(|token| {
            let mut token = token.to_string();
            for (placeholder, path) in substitutions {
                token = token.replace(placeholder, &path.display().to_string());
            }
            token
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_targets_are_a_closed_set() {
        assert!(ConversionRouter::is_supported_target("pdf"));
        assert!(ConversionRouter::is_supported_target("PDF"));
        assert!(!ConversionRouter::is_supported_target("docx"));
        assert!(!ConversionRouter::is_supported_target(""));
    }

    #[test]
    fn template_expansion_substitutes_tokens() {
        let argv = expand_template(
            "convert %SOURCE_FILE% -density 300 %DEST_FILE%",
            &[
                ("%SOURCE_FILE%", Path::new("/tmp/in.png")),
                ("%DEST_FILE%", Path::new("/tmp/out.pdf")),
            ],
        );
        assert_eq!(argv, vec!["convert", "/tmp/in.png", "-density", "300", "/tmp/out.pdf"]);
    }

    #[tokio::test]
    async fn same_extension_is_a_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.docx");
        std::fs::write(&input, b"bytes").unwrap();

        let router = ConversionRouter::new(&ConverterConfig::default(), dir.path()).unwrap();
        let out = router
            .convert(&input, "docx", "DOCX", dir.path())
            .await
            .unwrap();
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn unsupported_target_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.docx");
        std::fs::write(&input, b"bytes").unwrap();

        let router = ConversionRouter::new(&ConverterConfig::default(), dir.path()).unwrap();
        let err = router
            .convert(&input, "docx", "rtf", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedTarget(ext) if ext == "rtf"));
    }

    #[tokio::test]
    async fn image_extensions_route_to_the_image_path() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.jpg");
        std::fs::write(&input, b"not really a jpeg").unwrap();

        // A copy command stands in for ImageMagick; the office engine binary
        // does not exist, so reaching the image path is observable from the
        // produced artifact.
        let config = ConverterConfig {
            image_command: Some("cp %SOURCE_FILE% %DEST_FILE%".to_string()),
            soffice: "/nonexistent/soffice".to_string(),
            ..Default::default()
        };
        let router = ConversionRouter::new(&config, dir.path()).unwrap();
        let out = router
            .convert(&input, "jpg", "pdf", dir.path())
            .await
            .unwrap();
        assert!(out.is_file());
        assert_eq!(std::fs::read(&out).unwrap(), b"not really a jpeg");
    }
}
