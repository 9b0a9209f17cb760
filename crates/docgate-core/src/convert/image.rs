//! Image-to-PDF conversion via an external command template.
//!
//! The command line is fully configurable (ImageMagick's `convert` in the
//! usual deployment); `%SOURCE_FILE%` and `%DEST_FILE%` are replaced with the
//! input and output paths before the process is spawned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::convert::{expand_template, run_engine};
use crate::error::ConvertError;

const SOURCE_PLACEHOLDER: &str = "%SOURCE_FILE%";
const DEST_PLACEHOLDER: &str = "%DEST_FILE%";

pub struct ImageConverter {
    command: Option<String>,
    timeout: Option<Duration>,
}

impl ImageConverter {
    pub fn new(command: Option<String>, timeout: Option<Duration>) -> Self {
        let command = command.filter(|c| !c.trim().is_empty());
        if command.is_none() {
            debug!("image conversion command not configured, image path disabled");
        }
        Self { command, timeout }
    }

    pub fn is_configured(&self) -> bool {
        self.command.is_some()
    }

    /// Convert `input` to a PDF inside `outdir`. The artifact keeps the input
    /// file name with `.pdf` appended.
    pub async fn convert(&self, input: &Path, outdir: &Path) -> Result<PathBuf, ConvertError> {
        let template = self
            .command
            .as_deref()
            .ok_or(ConvertError::EngineNotConfigured("image command"))?;

        let file_name = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input");
        let output = outdir.join(format!("{file_name}.pdf"));

        let argv = expand_template(
            template,
            &[(SOURCE_PLACEHOLDER, input), (DEST_PLACEHOLDER, &output)],
        );
        let (program, args) = argv
            .split_first()
            .ok_or(ConvertError::EngineNotConfigured("image command"))?;

        info!(input = %input.display(), program, "running image conversion");
        let start = std::time::Instant::now();
        let status = run_engine(Command::new(program).args(args), self.timeout).await?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, code = ?status.code(), "image conversion finished");

        if !status.success() {
            return Err(ConvertError::EngineFailed(format!(
                "image command exited with {status}"
            )));
        }
        if !output.is_file() {
            return Err(ConvertError::MissingArtifact(output));
        }
        Ok(output)
    }
}
