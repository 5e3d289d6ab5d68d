//! Knowledge base ingestion: file type detection, text extraction and chunking.

pub mod extractor;
pub mod ingest;

pub use extractor::{extract_text, DocumentKind};
pub use ingest::{ingest_upload, Upload, UploadOutcome};
