//! Document data model: one logical record, its attached files, and the
//! independent action states tracked per file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::state::ActionState;

/// One logical record submitted for processing.
///
/// Owned exclusively by the processing pipeline for the duration of one
/// request; created by the store's `load`, handed back to the store's `save`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Document {
    /// Opaque record identifier.
    pub id: String,
    /// Attached files to process, in order.
    pub files: Vec<FileToWork>,
    /// Opaque free-form payload, passed through to persistence untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            files: Vec::new(),
            content: None,
        }
    }

    pub fn add_file(&mut self, file: FileToWork) {
        self.files.push(file);
    }
}

/// Ordered metadata fields extracted from one file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Metadata {
    fields: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, skipping empty values.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.fields.push((name.into(), value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One requested output format for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionTarget {
    /// Target extension (lowercase).
    pub extension: String,
    pub state: ActionState,
    /// Output artifact, set only on `Done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl ConversionTarget {
    pub fn todo(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into().to_lowercase(),
            state: ActionState::Todo,
            artifact: None,
        }
    }

    /// Record the outcome of a conversion call. The state becomes `Done` only
    /// when the produced artifact actually exists on disk; a reported success
    /// without a file on scratch storage is a failure.
    pub fn complete(&mut self, artifact: Option<PathBuf>) {
        match artifact {
            Some(path) if path.is_file() => {
                self.artifact = Some(path);
                self.state = ActionState::Done;
            }
            _ => self.state = ActionState::Fail,
        }
    }
}

/// One attached file under processing, with independent indexing, metadata
/// and per-target conversion states.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileToWork {
    /// Name of the attached file.
    pub file_name: String,
    /// Path to the file bytes on local scratch storage. Absent when the file
    /// is to be skipped entirely.
    pub input_path: Option<PathBuf>,
    /// State of the text extraction (indexing) action.
    pub index: ActionState,
    /// State of the metadata extraction action.
    pub meta: ActionState,
    /// Extracted text, present only when `index` is `Done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Extracted metadata, present only when `meta` is `Done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Requested conversions, keyed by target extension (keys unique).
    pub conversions: BTreeMap<String, ConversionTarget>,
}

impl FileToWork {
    pub fn new(file_name: impl Into<String>, input_path: Option<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            input_path,
            index: ActionState::Todo,
            meta: ActionState::Todo,
            text: None,
            metadata: None,
            conversions: BTreeMap::new(),
        }
    }

    /// Lowercase extension of the file name, empty when there is none.
    pub fn extension(&self) -> String {
        extension_of(&self.file_name)
    }

    /// Size in bytes of the file on scratch storage, if present.
    pub fn input_len(&self) -> Option<u64> {
        self.input_path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
    }

    /// Register a requested conversion target if not already present.
    pub fn request_conversion(&mut self, extension: &str) {
        let key = extension.to_lowercase();
        if key.is_empty() {
            return;
        }
        self.conversions
            .entry(key.clone())
            .or_insert_with(|| ConversionTarget::todo(key));
    }

    /// Targets still awaiting an attempt.
    pub fn todo_targets(&self) -> Vec<String> {
        self.conversions
            .values()
            .filter(|t| t.state == ActionState::Todo)
            .map(|t| t.extension.clone())
            .collect()
    }

    pub fn set_text(&mut self, text: String) {
        self.text = Some(text);
        self.index = ActionState::Done;
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = Some(metadata);
        self.meta = ActionState::Done;
    }

    pub fn mark_index_ignored(&mut self) {
        self.index.advance(ActionState::Ignore);
    }

    pub fn mark_index_failed(&mut self) {
        self.index.advance(ActionState::Fail);
    }

    pub fn mark_meta_ignored(&mut self) {
        self.meta.advance(ActionState::Ignore);
    }

    pub fn mark_meta_failed(&mut self) {
        self.meta.advance(ActionState::Fail);
    }

    /// Record a conversion outcome for one target extension.
    pub fn complete_conversion(&mut self, extension: &str, artifact: Option<PathBuf>) {
        if let Some(target) = self.conversions.get_mut(&extension.to_lowercase()) {
            if target.state == ActionState::Todo {
                target.complete(artifact);
            }
        }
    }

    pub fn mark_conversion_failed(&mut self, extension: &str) {
        if let Some(target) = self.conversions.get_mut(&extension.to_lowercase()) {
            target.state.advance(ActionState::Fail);
        }
    }

    /// Mark every still-pending conversion target as skipped.
    pub fn ignore_all_conversions(&mut self) {
        for target in self.conversions.values_mut() {
            target.state.advance(ActionState::Ignore);
        }
    }

    /// Mark every still-pending action (index, metadata, conversions) as
    /// skipped. Used when the file carries no input bytes at all.
    pub fn ignore_all(&mut self) {
        self.mark_index_ignored();
        self.mark_meta_ignored();
        self.ignore_all_conversions();
    }
}

/// Lowercase extension of a file name, empty when there is none.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
