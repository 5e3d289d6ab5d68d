//! Upload pipeline: store the file, record it, extract, then mark ready or error.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::booking_db::{BookingDatabase, DocumentStatus, NewDocument};
use crate::error::{BookingError, BookingResult};
use crate::knowledge::extractor::{extract_text, DocumentKind};
use crate::utils::TextUtils;

/// Cap on cleaned document text, in characters.
pub const MAX_CONTENT_CHARS: usize = 50_000;
/// Chunks close once their running word-length total reaches this many characters.
pub const CHUNK_SIZE: usize = 1000;

/// A file received from a client, already read into memory.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub title: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub message: String,
    pub document_id: i64,
    pub filename: String,
    pub status: DocumentStatus,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Store and process an uploaded document.
///
/// An unsupported extension is rejected before anything is written. Extraction
/// failures do not fail the upload: the document row is kept with status `error`.
/// If the row cannot be created, the stored file is removed and the error returned.
pub async fn ingest_upload(
    database: &BookingDatabase,
    upload_dir: &Path,
    upload: Upload,
) -> BookingResult<UploadOutcome> {
    let kind = DocumentKind::from_file_name(&upload.file_name)?;
    if upload.bytes.is_empty() {
        return Err(BookingError::invalid("Uploaded file is empty"));
    }

    tokio::fs::create_dir_all(upload_dir).await?;
    let stored_name = format!(
        "{}_{}",
        Uuid::new_v4(),
        TextUtils::sanitize_file_name(&upload.file_name)
    );
    let file_path: PathBuf = upload_dir.join(stored_name);
    tokio::fs::write(&file_path, &upload.bytes).await?;

    let title = blank_to_none(upload.title).unwrap_or_else(|| upload.file_name.clone());
    let created = database.documents.create(NewDocument {
        title,
        file_name: upload.file_name.clone(),
        file_type: kind.extension().to_string(),
        file_size: upload.bytes.len() as i64,
        file_path: file_path.to_string_lossy().into_owned(),
        tags: blank_to_none(upload.tags),
    });
    let document = match created {
        Ok(document) => document,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&file_path).await {
                warn!("Failed to remove {} after error: {}", file_path.display(), cleanup);
            }
            return Err(e);
        }
    };

    let extract_path = file_path.clone();
    let extracted = tokio::task::spawn_blocking(move || extract_text(&extract_path, kind))
        .await
        .map_err(|e| anyhow::anyhow!("Extraction task failed: {}", e))?;

    let status = match extracted {
        Ok(raw) => {
            let content = TextUtils::clean_extracted_text(&raw, MAX_CONTENT_CHARS);
            let chunks = TextUtils::chunk_words(&content, CHUNK_SIZE);
            database.documents.mark_ready(document.id, &content, &chunks)?;
            DocumentStatus::Ready
        }
        Err(e) => {
            error!("Failed to process document {}: {}", document.id, e);
            database.documents.mark_error(document.id, &e.to_string())?;
            DocumentStatus::Error
        }
    };

    info!(
        "Uploaded document {} ({}) with status {}",
        document.id, upload.file_name, status
    );
    Ok(UploadOutcome {
        success: true,
        message: "File uploaded successfully".to_string(),
        document_id: document.id,
        filename: upload.file_name,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, bytes: &[u8]) -> Upload {
        Upload {
            file_name: name.to_string(),
            bytes: bytes.to_vec(),
            title: None,
            tags: Some(" care ".into()),
        }
    }

    #[tokio::test]
    async fn test_text_upload_becomes_searchable() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let outcome = ingest_upload(
            &db,
            dir.path(),
            upload("aftercare.txt", b"Aftercare: avoid water for two hours\n\n"),
        )
        .await
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.status, DocumentStatus::Ready);
        let doc = db.documents.get(outcome.document_id).unwrap();
        assert_eq!(doc.title, "aftercare.txt");
        assert_eq!(doc.tags.as_deref(), Some("care"));
        assert_eq!(doc.file_type, ".txt");
        assert!(Path::new(&doc.file_path).exists());
        assert!(doc.file_path.ends_with("_aftercare.txt"));

        let hits = db.documents.search_chunks("AFTERCARE", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_keeps_row_in_error() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let outcome = ingest_upload(&db, dir.path(), upload("old.doc", b"\xd0\xcf\x11\xe0"))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.status, DocumentStatus::Error);
        let doc = db.documents.get(outcome.document_id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Error);
        assert!(doc.error_message.unwrap().contains(".doc"));
    }

    #[tokio::test]
    async fn test_unsupported_type_writes_nothing() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = ingest_upload(&db, dir.path(), upload("nails.png", b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidArgument(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(db.stats().unwrap().total_documents, 0);
    }

    #[tokio::test]
    async fn test_long_text_is_chunked() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let body = "polish ".repeat(500);
        let mut up = upload("long.txt", body.as_bytes());
        up.title = Some("Long guide".into());
        let outcome = ingest_upload(&db, dir.path(), up).await.unwrap();

        let chunks = db.documents.list_chunks(outcome.document_id).unwrap();
        // 7 chars per word: a chunk closes after 143 words.
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].tokens, 143);
        assert_eq!(db.documents.get(outcome.document_id).unwrap().title, "Long guide");
    }
}
