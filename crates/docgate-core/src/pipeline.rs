//! Document processing pipeline.
//!
//! One `process` call handles one document: load it from the store, apply the
//! activation policy to every attached file (indexing, metadata extraction,
//! format conversion), and save the results. Per-file and per-target failures
//! are recorded in the action states and never abort the rest of the
//! document; only store failures surface as errors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::activation::ActivationParams;
use crate::convert::ConversionRouter;
use crate::document::FileToWork;
use crate::error::StoreError;
use crate::extract::TextExtractor;
use crate::state::ActionState;
use crate::store::DocumentStore;

/// One document-processing request.
pub struct ProcessRequest {
    /// Identifier of the document to process.
    pub doc_id: String,
    /// Conversion target extensions requested for every attached file.
    pub targets: Vec<String>,
    /// Opaque payload attached to the persisted document untouched.
    pub content: Option<serde_json::Value>,
    /// Connection-private scratch directory for staged files and artifacts.
    pub scratch: PathBuf,
}

pub struct DocumentProcessor {
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    router: Arc<ConversionRouter>,
}

impl DocumentProcessor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        router: Arc<ConversionRouter>,
    ) -> Self {
        Self {
            store,
            extractor,
            router,
        }
    }

    /// Process one document under the given activation snapshot. Returns
    /// `Ok(false)` when the document does not exist.
    pub async fn process(
        &self,
        params: &ActivationParams,
        request: ProcessRequest,
    ) -> Result<bool, StoreError> {
        let start = Instant::now();
        let Some(mut document) = self.store.load(&request.doc_id, &request.scratch)? else {
            info!(id = %request.doc_id, "document not found, nothing to process");
            return Ok(false);
        };
        document.content = request.content;

        for file in &mut document.files {
            if file.input_path.is_none() {
                file.ignore_all();
                continue;
            }
            for target in &request.targets {
                file.request_conversion(target);
            }
            self.index_file(params, file);
            self.convert_file(params, file, &request.scratch).await;
        }

        let saved = self.store.save(&document)?;
        info!(
            id = %document.id,
            files = document.files.len(),
            saved,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "document processed"
        );
        Ok(saved)
    }

    /// Apply the indexing policy to one file: extract text and metadata,
    /// metadata only, or skip both. Indexing and metadata are decoupled
    /// actions with shared input; only actions still pending are attempted,
    /// so a file already in a terminal state is never re-extracted.
    fn index_file(&self, params: &ActivationParams, file: &mut FileToWork) {
        let index_todo = file.index == ActionState::Todo;
        let meta_todo = file.meta == ActionState::Todo;
        if !index_todo && !meta_todo {
            return;
        }

        let ext = file.extension();
        let len = file.input_len().unwrap_or(0);
        let indexable = params.index_enabled
            && (params.index_max_file_size == 0 || len <= params.index_max_file_size)
            && params.index_extension_valid(&ext);
        if !indexable {
            file.mark_index_ignored();
            file.mark_meta_ignored();
            return;
        }

        let Some(path) = file.input_path.clone() else {
            file.mark_index_ignored();
            file.mark_meta_ignored();
            return;
        };

        if params.ocr_disabled_for(&ext) {
            // Text extraction deliberately skipped; metadata is still worth
            // having for image-like files.
            file.mark_index_ignored();
            if meta_todo {
                self.extract_metadata_into(file, &path);
            }
            return;
        }

        if index_todo {
            match self.extractor.extract(&path, params.max_chars()) {
                Ok(extraction) => {
                    match extraction.text {
                        Some(text) => file.set_text(text),
                        None => file.mark_index_failed(),
                    }
                    if meta_todo {
                        file.set_metadata(extraction.metadata);
                    }
                }
                Err(err) => {
                    warn!(file = %file.file_name, %err, "text extraction failed");
                    file.mark_index_failed();
                    if meta_todo {
                        file.mark_meta_failed();
                    }
                }
            }
        } else if meta_todo {
            self.extract_metadata_into(file, &path);
        }
    }

    fn extract_metadata_into(&self, file: &mut FileToWork, path: &std::path::Path) {
        match self.extractor.extract_metadata(path) {
            Ok(meta) => file.set_metadata(meta),
            Err(err) => {
                warn!(file = %file.file_name, %err, "metadata extraction failed");
                file.mark_meta_failed();
            }
        }
    }

    /// Apply the conversion policy to one file's pending targets.
    async fn convert_file(
        &self,
        params: &ActivationParams,
        file: &mut FileToWork,
        scratch: &std::path::Path,
    ) {
        let ext = file.extension();
        let len = file.input_len().unwrap_or(0);

        let convertible = params.convert_enabled
            && (params.convert_max_file_size == 0 || len <= params.convert_max_file_size)
            && params.convert_extension_valid(&ext);
        if !convertible {
            file.ignore_all_conversions();
            return;
        }

        let Some(input) = file.input_path.clone() else {
            file.ignore_all_conversions();
            return;
        };

        for target in file.todo_targets() {
            match self.router.convert(&input, &ext, &target, scratch).await {
                Ok(artifact) => file.complete_conversion(&target, Some(artifact)),
                Err(err) => {
                    warn!(file = %file.file_name, target, %err, "conversion failed");
                    file.mark_conversion_failed(&target);
                }
            }
        }

        // Nothing may stay pending once the file has been attempted.
        for target in file.conversions.values_mut() {
            target.state.advance(ActionState::Fail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConverterConfig;
    use crate::extract::PlainTextExtractor;
    use crate::store::FsDocumentStore;
    use std::path::Path;

    struct Fixture {
        _root: tempfile::TempDir,
        scratch: tempfile::TempDir,
        processor: DocumentProcessor,
    }

    fn fixture(files: &[(&str, &[u8])]) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let dir = root.path().join("doc-1");
        std::fs::create_dir_all(&dir).unwrap();
        for (name, bytes) in files {
            std::fs::write(dir.join(name), bytes).unwrap();
        }

        let config = ConverterConfig {
            image_command: Some("cp %SOURCE_FILE% %DEST_FILE%".to_string()),
            soffice: "/nonexistent/soffice".to_string(),
            ..Default::default()
        };
        let router = Arc::new(ConversionRouter::new(&config, scratch.path()).unwrap());
        let processor = DocumentProcessor::new(
            Arc::new(FsDocumentStore::new(root.path())),
            Arc::new(PlainTextExtractor),
            router,
        );
        Fixture {
            _root: root,
            scratch,
            processor,
        }
    }

    fn request(scratch: &Path, targets: &[&str]) -> ProcessRequest {
        ProcessRequest {
            doc_id: "doc-1".to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            content: None,
            scratch: scratch.to_path_buf(),
        }
    }

    fn allow_all() -> ActivationParams {
        ActivationParams {
            index_enabled: true,
            convert_enabled: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_document_is_not_an_error() {
        let fx = fixture(&[]);
        std::fs::remove_dir_all(fx._root.path().join("doc-1")).unwrap();
        let saved = fx
            .processor
            .process(&allow_all(), request(fx.scratch.path(), &["pdf"]))
            .await
            .unwrap();
        assert!(!saved);
    }

    #[tokio::test]
    async fn indexes_and_converts_an_image_attachment() {
        let fx = fixture(&[("scan.jpg", b"jpeg bytes")]);
        let saved = fx
            .processor
            .process(&allow_all(), request(fx.scratch.path(), &["pdf"]))
            .await
            .unwrap();
        assert!(saved);

        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(fx._root.path().join("doc-1/docgate.json")).unwrap(),
        )
        .unwrap();
        let file = &report["files"][0];
        assert_eq!(file["index"], "done");
        assert_eq!(file["meta"], "done");
        assert_eq!(file["conversions"]["pdf"]["state"], "done");

        let artifact = fx._root.path().join("doc-1/converted/scan.jpg.pdf");
        assert!(artifact.is_file());
    }

    #[tokio::test]
    async fn disabled_conversion_skips_all_targets() {
        let fx = fixture(&[("scan.jpg", b"jpeg bytes")]);
        let params = ActivationParams {
            index_enabled: true,
            convert_enabled: false,
            ..Default::default()
        };
        fx.processor
            .process(&params, request(fx.scratch.path(), &["pdf"]))
            .await
            .unwrap();

        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(fx._root.path().join("doc-1/docgate.json")).unwrap(),
        )
        .unwrap();
        let file = &report["files"][0];
        assert_eq!(file["index"], "done");
        assert_eq!(file["conversions"]["pdf"]["state"], "ignore");
    }

    #[tokio::test]
    async fn oversized_file_is_ignored_for_indexing() {
        let fx = fixture(&[("big.txt", b"0123456789")]);
        let params = ActivationParams {
            index_enabled: true,
            index_max_file_size: 5,
            convert_enabled: true,
            ..Default::default()
        };
        fx.processor
            .process(&params, request(fx.scratch.path(), &[]))
            .await
            .unwrap();

        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(fx._root.path().join("doc-1/docgate.json")).unwrap(),
        )
        .unwrap();
        let file = &report["files"][0];
        assert_eq!(file["index"], "ignore");
        assert_eq!(file["meta"], "ignore");
    }

    #[tokio::test]
    async fn ocr_excluded_extension_gets_metadata_only() {
        let fx = fixture(&[("scan.tif", b"tiff bytes")]);
        let params = ActivationParams {
            index_enabled: true,
            ocr_enabled: false,
            ocr_file_types_exclude: vec!["tif".to_string()],
            ..Default::default()
        };
        fx.processor
            .process(&params, request(fx.scratch.path(), &[]))
            .await
            .unwrap();

        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(fx._root.path().join("doc-1/docgate.json")).unwrap(),
        )
        .unwrap();
        let file = &report["files"][0];
        assert_eq!(file["index"], "ignore");
        assert_eq!(file["meta"], "done");
        assert!(file["text"].is_null());
    }

    #[tokio::test]
    async fn unsupported_target_fails_without_touching_others() {
        let fx = fixture(&[("scan.jpg", b"jpeg bytes")]);
        let saved = fx
            .processor
            .process(&allow_all(), request(fx.scratch.path(), &["pdf", "rtf"]))
            .await
            .unwrap();
        assert!(saved);

        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(fx._root.path().join("doc-1/docgate.json")).unwrap(),
        )
        .unwrap();
        let conversions = &report["files"][0]["conversions"];
        assert_eq!(conversions["pdf"]["state"], "done");
        assert_eq!(conversions["rtf"]["state"], "fail");
    }

    #[tokio::test]
    async fn same_extension_target_passes_through() {
        let fx = fixture(&[("notes.txt", b"hello")]);
        fx.processor
            .process(&allow_all(), request(fx.scratch.path(), &["txt"]))
            .await
            .unwrap();

        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(fx._root.path().join("doc-1/docgate.json")).unwrap(),
        )
        .unwrap();
        let target = &report["files"][0]["conversions"]["txt"];
        assert_eq!(target["state"], "done");
        // Pass-through artifact is the staged input itself.
        assert!(fx._root.path().join("doc-1/converted/notes.txt").is_file());
    }

    #[tokio::test]
    async fn terminal_states_are_never_reattempted() {
        let fx = fixture(&[("note.txt", b"hello")]);
        // A file whose actions already finished, pointing at a path that
        // would fail extraction if it were attempted again.
        let mut file = crate::document::FileToWork::new(
            "note.txt",
            Some(fx.scratch.path().join("missing.txt")),
        );
        file.set_text("cached".to_string());
        file.set_metadata(crate::document::Metadata::new());

        fx.processor.index_file(&allow_all(), &mut file);
        assert_eq!(file.index, crate::state::ActionState::Done);
        assert_eq!(file.meta, crate::state::ActionState::Done);
        assert_eq!(file.text.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn metadata_is_attempted_after_index_was_skipped() {
        let fx = fixture(&[("note.txt", b"hello")]);
        let path = fx.scratch.path().join("note.txt");
        std::fs::write(&path, b"hello").unwrap();

        let mut file = crate::document::FileToWork::new("note.txt", Some(path));
        file.mark_index_ignored();

        fx.processor.index_file(&allow_all(), &mut file);
        assert_eq!(file.index, crate::state::ActionState::Ignore);
        assert_eq!(file.meta, crate::state::ActionState::Done);
        assert!(file.text.is_none());
    }

    #[tokio::test]
    async fn processing_is_idempotent() {
        let fx = fixture(&[("scan.jpg", b"jpeg bytes")]);
        for _ in 0..2 {
            let scratch = tempfile::tempdir().unwrap();
            let saved = fx
                .processor
                .process(&allow_all(), request(scratch.path(), &["pdf"]))
                .await
                .unwrap();
            assert!(saved);
        }
        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(fx._root.path().join("doc-1/docgate.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(report["files"][0]["conversions"]["pdf"]["state"], "done");
    }
}
