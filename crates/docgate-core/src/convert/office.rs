//! Office document conversion and comparison via a headless office engine.
//!
//! Conversions shell out to `soffice --headless --convert-to`, one engine
//! process at a time per pool slot. Each slot owns a private profile
//! directory (`-env:UserInstallation=...`) because concurrent soffice
//! processes cannot share one profile. The pool is shared by all connection
//! workers; the semaphore is the only coordination they need.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::convert::{expand_template, run_engine, ConverterConfig};
use crate::error::ConvertError;

const PREV_PLACEHOLDER: &str = "%PREV_FILE%";
const NEXT_PLACEHOLDER: &str = "%NEXT_FILE%";
const DEST_PLACEHOLDER: &str = "%DEST_FILE%";

// PDF/A-1 export filter arguments, LibreOffice 7.4+ syntax.
const PDFA_FILTER: &str =
    r#"pdf:writer_pdf_Export:{"SelectPdfVersion":{"type":"long","value":"1"}}"#;

pub struct OfficeEngine {
    soffice: String,
    pdfa: bool,
    compare_command: Option<String>,
    timeout: Option<Duration>,
    slots: Semaphore,
    profiles: Mutex<Vec<PathBuf>>,
}

impl OfficeEngine {
    /// Create the engine pool, materializing one profile directory per slot
    /// under `profile_root`.
    pub fn new(config: &ConverterConfig, profile_root: &Path) -> std::io::Result<Self> {
        let instances = config.office_instances.max(1);
        let mut profiles = Vec::with_capacity(instances);
        for slot in 0..instances {
            let dir = profile_root.join(format!("office-profile-{slot}"));
            std::fs::create_dir_all(&dir)?;
            profiles.push(dir);
        }
        debug!(instances, soffice = %config.soffice, "office engine pool ready");

        Ok(Self {
            soffice: config.soffice.clone(),
            pdfa: config.pdfa,
            compare_command: config
                .compare_command
                .clone()
                .filter(|c| !c.trim().is_empty()),
            timeout: config.timeout(),
            slots: Semaphore::new(instances),
            profiles: Mutex::new(profiles),
        })
    }

    /// Convert `input` to PDF (or PDF/A when configured) inside `outdir`.
    pub async fn convert_to_pdf(
        &self,
        input: &Path,
        outdir: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let _permit = self.slots.acquire().await.expect("engine pool closed");
        let profile = self.take_profile();
        let result = self.run_conversion(&profile, input, outdir).await;
        self.put_profile(profile);
        result
    }

    async fn run_conversion(
        &self,
        profile: &Path,
        input: &Path,
        outdir: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let target = if self.pdfa { PDFA_FILTER } else { "pdf" };
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let output = outdir.join(format!("{stem}.pdf"));

        info!(input = %input.display(), pdfa = self.pdfa, "running office conversion");
        let start = std::time::Instant::now();
        let status = run_engine(
            Command::new(&self.soffice)
                .arg("--headless")
                .arg("--norestore")
                .arg(format!("-env:UserInstallation=file://{}", profile.display()))
                .arg("--convert-to")
                .arg(target)
                .arg("--outdir")
                .arg(outdir)
                .arg(input),
            self.timeout,
        )
        .await?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, code = ?status.code(), "office conversion finished");

        if !status.success() {
            return Err(ConvertError::EngineFailed(format!(
                "office engine exited with {status}"
            )));
        }
        if !output.is_file() {
            return Err(ConvertError::MissingArtifact(output));
        }
        Ok(output)
    }

    /// Produce a visual comparison of two document versions into `outdir`,
    /// in the given output extension.
    pub async fn compare(
        &self,
        prev: &Path,
        next: &Path,
        out_ext: &str,
        outdir: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let template = self
            .compare_command
            .as_deref()
            .ok_or(ConvertError::EngineNotConfigured("compare command"))?;

        let output = outdir.join(format!("diff.{out_ext}"));
        let argv = expand_template(
            template,
            &[
                (PREV_PLACEHOLDER, prev),
                (NEXT_PLACEHOLDER, next),
                (DEST_PLACEHOLDER, &output),
            ],
        );
        let (program, args) = argv
            .split_first()
            .ok_or(ConvertError::EngineNotConfigured("compare command"))?;

        let _permit = self.slots.acquire().await.expect("engine pool closed");
        info!(prev = %prev.display(), next = %next.display(), out_ext, "running document comparison");
        let start = std::time::Instant::now();
        let status = run_engine(Command::new(program).args(args), self.timeout).await?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, code = ?status.code(), "document comparison finished");

        if !status.success() {
            return Err(ConvertError::EngineFailed(format!(
                "compare command exited with {status}"
            )));
        }
        if !output.is_file() {
            return Err(ConvertError::MissingArtifact(output));
        }
        Ok(output)
    }

    fn take_profile(&self) -> PathBuf {
        // A permit is held, so a profile is always available.
        self.profiles
            .lock()
            .expect("profile lock poisoned")
            .pop()
            .expect("profile pool exhausted with permit held")
    }

    fn put_profile(&self, profile: PathBuf) {
        self.profiles
            .lock()
            .expect("profile lock poisoned")
            .push(profile);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(dir: &Path, config: ConverterConfig) -> OfficeEngine {
        OfficeEngine::new(&config, dir).unwrap()
    }

    #[test]
    fn pool_materializes_profile_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConverterConfig {
            office_instances: 3,
            ..Default::default()
        };
        let _engine = engine(dir.path(), config);
        for slot in 0..3 {
            assert!(dir.path().join(format!("office-profile-{slot}")).is_dir());
        }
    }

    #[tokio::test]
    async fn missing_engine_binary_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.docx");
        std::fs::write(&input, b"doc").unwrap();

        let config = ConverterConfig {
            soffice: "/nonexistent/soffice".to_string(),
            ..Default::default()
        };
        let err = engine(dir.path(), config)
            .convert_to_pdf(&input, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Io(_)));
    }

    #[tokio::test]
    async fn compare_requires_a_configured_command() {
        let dir = tempfile::tempdir().unwrap();
        let prev = dir.path().join("v1.docx");
        let next = dir.path().join("v2.docx");
        std::fs::write(&prev, b"one").unwrap();
        std::fs::write(&next, b"two").unwrap();

        let err = engine(dir.path(), ConverterConfig::default())
            .compare(&prev, &next, "pdf", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::EngineNotConfigured(_)));
    }

    #[tokio::test]
    async fn compare_runs_the_template_and_verifies_output() {
        let dir = tempfile::tempdir().unwrap();
        let prev = dir.path().join("v1.docx");
        let next = dir.path().join("v2.docx");
        std::fs::write(&prev, b"one").unwrap();
        std::fs::write(&next, b"two").unwrap();

        let config = ConverterConfig {
            compare_command: Some("cp %NEXT_FILE% %DEST_FILE%".to_string()),
            ..Default::default()
        };
        let out = engine(dir.path(), config)
            .compare(&prev, &next, "docx", dir.path())
            .await
            .unwrap();
        assert_eq!(out.file_name().unwrap(), "diff.docx");
        assert_eq!(std::fs::read(&out).unwrap(), b"two");
    }
}
