//! docgate-core: Core library for the docgate document processing service
//!
//! This crate provides:
//! - The per-file action data model (indexing, metadata, conversion targets)
//! - Remotely configurable activation policy (what may be indexed/converted)
//! - Text/metadata extraction and document store traits with default impls
//! - Conversion engines (image command template, office subprocess pool) and
//!   the routing layer that picks between them
//! - The document processing pipeline that applies policy per attached file

pub mod activation;
pub mod convert;
pub mod document;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod state;
pub mod store;

// Re-exports for convenience
pub use activation::{ActivationCell, ActivationParams};
pub use convert::{ConversionRouter, ConverterConfig, ImageConverter, OfficeEngine};
pub use document::{ConversionTarget, Document, FileToWork, Metadata};
pub use error::{ConvertError, ExtractError, StoreError};
pub use extract::{Extraction, PlainTextExtractor, TextExtractor};
pub use pipeline::{DocumentProcessor, ProcessRequest};
pub use state::ActionState;
pub use store::{DocumentStore, FsDocumentStore};
