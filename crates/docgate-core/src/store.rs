//! Document persistence collaborator interface.
//!
//! The pipeline sees documents only through `load` and `save`; where the
//! record and its files actually live is the store's business. The built-in
//! filesystem store keeps one directory per document under a spool root.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::document::{Document, FileToWork};
use crate::error::StoreError;
use crate::state::ActionState;

/// Name of the processing report written next to the document's files.
const REPORT_FILE: &str = "docgate.json";
/// Subdirectory receiving conversion artifacts on save.
const ARTIFACT_DIR: &str = "converted";

/// Narrow interface to document persistence.
pub trait DocumentStore: Send + Sync {
    /// Load the document with `id`, staging its attached files under
    /// `scratch`. Returns `Ok(None)` when no such document exists.
    fn load(&self, id: &str, scratch: &Path) -> Result<Option<Document>, StoreError>;

    /// Persist processing results. Returns `true` when the document was
    /// actually updated.
    fn save(&self, document: &Document) -> Result<bool, StoreError>;
}

/// Filesystem-backed store: `<root>/<id>/` holds the attached files; `save`
/// writes a JSON report beside them and collects conversion artifacts into a
/// `converted/` subdirectory.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        // Identifiers come off the wire; keep them from escaping the root.
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(StoreError::Failed(format!("invalid document id: {id:?}")));
        }
        Ok(self.root.join(id))
    }
}

impl DocumentStore for FsDocumentStore {
    fn load(&self, id: &str, scratch: &Path) -> Result<Option<Document>, StoreError> {
        let dir = self.document_dir(id)?;
        if !dir.is_dir() {
            debug!(id, "document not found in spool");
            return Ok(None);
        }

        let mut document = Document::new(id);
        let mut entries: Vec<_> = std::fs::read_dir(&dir)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|e| e.path().is_file())
            .filter(|e| e.file_name() != REPORT_FILE)
            .collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let staged = scratch.join(&file_name);
            std::fs::copy(entry.path(), &staged)?;
            document.add_file(FileToWork::new(file_name, Some(staged)));
        }
        debug!(id, files = document.files.len(), "document staged to scratch");
        Ok(Some(document))
    }

    fn save(&self, document: &Document) -> Result<bool, StoreError> {
        let dir = self.document_dir(&document.id)?;
        if !dir.is_dir() {
            warn!(id = %document.id, "document directory vanished before save");
            return Ok(false);
        }

        for file in &document.files {
            for target in file.conversions.values() {
                if target.state != ActionState::Done {
                    continue;
                }
                let Some(artifact) = target.artifact.as_deref() else {
                    continue;
                };
                let artifact_dir = dir.join(ARTIFACT_DIR);
                std::fs::create_dir_all(&artifact_dir)?;
                let name = artifact
                    .file_name()
                    .ok_or_else(|| {
                        StoreError::Failed(format!("artifact has no file name: {artifact:?}"))
                    })?;
                std::fs::copy(artifact, artifact_dir.join(name))?;
            }
        }

        let report = serde_json::to_vec_pretty(document)?;
        std::fs::write(dir.join(REPORT_FILE), report)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spool_with_doc(root: &Path, id: &str, files: &[(&str, &[u8])]) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        for (name, bytes) in files {
            std::fs::write(dir.join(name), bytes).unwrap();
        }
    }

    #[test]
    fn load_stages_files_into_scratch() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        spool_with_doc(root.path(), "doc-1", &[("a.txt", b"aaa"), ("b.pdf", b"%PDF")]);

        let store = FsDocumentStore::new(root.path());
        let doc = store.load("doc-1", scratch.path()).unwrap().unwrap();
        assert_eq!(doc.id, "doc-1");
        assert_eq!(doc.files.len(), 2);
        for file in &doc.files {
            let staged = file.input_path.as_deref().unwrap();
            assert!(staged.starts_with(scratch.path()));
            assert!(staged.is_file());
        }
    }

    #[test]
    fn missing_document_loads_as_none() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(root.path());
        assert!(store.load("absent", scratch.path()).unwrap().is_none());
    }

    #[test]
    fn hostile_ids_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(root.path());
        assert!(store.load("../etc", scratch.path()).is_err());
        assert!(store.load("", scratch.path()).is_err());
    }

    #[test]
    fn save_writes_report_and_collects_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        spool_with_doc(root.path(), "doc-2", &[("report.docx", b"doc")]);

        let store = FsDocumentStore::new(root.path());
        let mut doc = store.load("doc-2", scratch.path()).unwrap().unwrap();

        let artifact = scratch.path().join("report.docx.pdf");
        std::fs::write(&artifact, b"%PDF converted").unwrap();
        doc.files[0].request_conversion("pdf");
        doc.files[0].complete_conversion("pdf", Some(artifact));

        assert!(store.save(&doc).unwrap());
        let saved_dir = root.path().join("doc-2");
        assert!(saved_dir.join(REPORT_FILE).is_file());
        assert_eq!(
            std::fs::read(saved_dir.join(ARTIFACT_DIR).join("report.docx.pdf")).unwrap(),
            b"%PDF converted"
        );

        // The report is not picked up as an attachment on reload.
        let scratch2 = tempfile::tempdir().unwrap();
        let reloaded = store.load("doc-2", scratch2.path()).unwrap().unwrap();
        assert_eq!(reloaded.files.len(), 1);
    }
}
