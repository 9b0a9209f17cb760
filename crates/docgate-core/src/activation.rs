//! Remotely configurable activation policy.
//!
//! The daemon starts with no activation parameters; a control client delivers
//! a JSON descriptor over the wire (see the daemon's CONFIG path) and every
//! document-processing decision reads the resulting snapshot.

use std::sync::{Arc, RwLock};

use serde::Deserialize;

/// Policy snapshot controlling what indexing/conversion is permitted.
///
/// All fields carry serde defaults so a partial descriptor such as
/// `{"indexEnabled":true,"convertEnabled":false}` applies cleanly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivationParams {
    /// Text extraction (indexing) enabled at all.
    pub index_enabled: bool,
    /// Max file size in bytes for indexing; 0 = no limit.
    pub index_max_file_size: u64,
    /// Max characters of text to extract; 0 = no limit.
    pub index_max_chars: u64,
    /// Extension allow-list for indexing; empty = all extensions.
    pub index_valid_extensions: Vec<String>,
    /// OCR enabled; when false, extensions listed in the exclusion set get
    /// metadata-only treatment.
    pub ocr_enabled: bool,
    /// Extensions excluded from text extraction while OCR is disabled.
    pub ocr_file_types_exclude: Vec<String>,
    /// Format conversion enabled at all.
    pub convert_enabled: bool,
    /// Max file size in bytes for conversion; 0 = no limit.
    pub convert_max_file_size: u64,
    /// Extension allow-list for conversion; empty = all extensions.
    pub convert_valid_extensions: Vec<String>,
}

impl ActivationParams {
    /// Parse the JSON descriptor delivered over the wire.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn index_extension_valid(&self, ext: &str) -> bool {
        extension_allowed(&self.index_valid_extensions, ext)
    }

    pub fn convert_extension_valid(&self, ext: &str) -> bool {
        extension_allowed(&self.convert_valid_extensions, ext)
    }

    /// OCR is off for this extension: globally disabled and the extension is
    /// in the exclusion set. Such files get metadata extraction only.
    pub fn ocr_disabled_for(&self, ext: &str) -> bool {
        !self.ocr_enabled
            && self
                .ocr_file_types_exclude
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Character cap for text extraction, `None` when unlimited.
    pub fn max_chars(&self) -> Option<usize> {
        (self.index_max_chars > 0).then_some(self.index_max_chars as usize)
    }
}

fn extension_allowed(allow_list: &[String], ext: &str) -> bool {
    allow_list.is_empty() || allow_list.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// Process-wide holder for the activation snapshot.
///
/// Readers clone the current `Arc` and keep it for the whole request, so a
/// concurrent reconfiguration can never expose a half-applied policy; writers
/// install a whole new snapshot.
#[derive(Debug, Default)]
pub struct ActivationCell {
    inner: RwLock<Option<Arc<ActivationParams>>>,
}

impl ActivationCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, `None` until the first CONFIG is applied.
    pub fn snapshot(&self) -> Option<Arc<ActivationParams>> {
        self.inner.read().expect("activation lock poisoned").clone()
    }

    pub fn is_configured(&self) -> bool {
        self.inner
            .read()
            .expect("activation lock poisoned")
            .is_some()
    }

    /// Atomically install a new snapshot, replacing any previous one.
    pub fn install(&self, params: ActivationParams) {
        *self.inner.write().expect("activation lock poisoned") = Some(Arc::new(params));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_descriptor_applies_with_defaults() {
        let params =
            ActivationParams::from_json(r#"{"indexEnabled":true,"convertEnabled":false}"#).unwrap();
        assert!(params.index_enabled);
        assert!(!params.convert_enabled);
        assert_eq!(params.index_max_file_size, 0);
        assert!(params.index_valid_extensions.is_empty());
        assert!(params.max_chars().is_none());
    }

    #[test]
    fn full_descriptor() {
        let json = r#"{
            "indexEnabled": true,
            "indexMaxFileSize": 1048576,
            "indexMaxChars": 100000,
            "indexValidExtensions": ["txt", "pdf", "docx"],
            "ocrEnabled": false,
            "ocrFileTypesExclude": ["tif", "png"],
            "convertEnabled": true,
            "convertMaxFileSize": 2097152,
            "convertValidExtensions": ["docx"]
        }"#;
        let params = ActivationParams::from_json(json).unwrap();
        assert!(params.index_extension_valid("TXT"));
        assert!(!params.index_extension_valid("exe"));
        assert!(params.ocr_disabled_for("TIF"));
        assert!(!params.ocr_disabled_for("txt"));
        assert_eq!(params.max_chars(), Some(100_000));
        assert!(params.convert_extension_valid("docx"));
        assert!(!params.convert_extension_valid("xlsx"));
    }

    #[test]
    fn empty_allow_list_permits_everything() {
        let params = ActivationParams::default();
        assert!(params.index_extension_valid("anything"));
        assert!(params.convert_extension_valid(""));
    }

    #[test]
    fn cell_swaps_whole_snapshots() {
        let cell = ActivationCell::new();
        assert!(!cell.is_configured());
        assert!(cell.snapshot().is_none());

        cell.install(ActivationParams {
            index_enabled: true,
            ..Default::default()
        });
        let first = cell.snapshot().unwrap();
        assert!(first.index_enabled);

        cell.install(ActivationParams::default());
        // The earlier snapshot is unchanged; the cell serves the new one.
        assert!(first.index_enabled);
        assert!(!cell.snapshot().unwrap().index_enabled);
    }
}
