//! Knowledge base documents: upload, curation and search.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::booking_db::{ChunkMatch, DocumentChunk, DocumentUpdate, KnowledgeDocument};
use crate::error::{BookingError, BookingResult};
use crate::knowledge::{ingest_upload, Upload, UploadOutcome};
use crate::shared_state::AppState;

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_list_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<ChunkMatch>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<DocumentListQuery>,
) -> BookingResult<Json<Vec<KnowledgeDocument>>> {
    let documents = state
        .database
        .documents
        .list(query.search.as_deref(), query.skip, query.limit)?;
    Ok(Json(documents))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> BookingResult<Json<KnowledgeDocument>> {
    Ok(Json(state.database.documents.get(id)?))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<DocumentUpdate>,
) -> BookingResult<Json<KnowledgeDocument>> {
    Ok(Json(state.database.documents.update(id, update)?))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> BookingResult<Json<Value>> {
    state.database.documents.soft_delete(id)?;
    info!("Deleted knowledge document {}", id);
    Ok(Json(json!({"message": "Document deleted successfully"})))
}

pub async fn document_chunks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> BookingResult<Json<Vec<DocumentChunk>>> {
    Ok(Json(state.database.documents.list_chunks(id)?))
}

/// Multipart fields: `file` (required), `title` and `tags` (optional).
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> BookingResult<Json<UploadOutcome>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut title = None;
    let mut tags = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BookingError::invalid(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| BookingError::invalid("Uploaded file has no name"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| BookingError::invalid(format!("Read error: {}", e)))?;
                file = Some((file_name, bytes.to_vec()));
            }
            "title" | "tags" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| BookingError::invalid(format!("Read error: {}", e)))?;
                if name == "title" {
                    title = Some(text);
                } else {
                    tags = Some(text);
                }
            }
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| BookingError::invalid("No file provided"))?;
    let outcome = ingest_upload(
        &state.database,
        &state.config.upload_dir,
        Upload {
            file_name,
            bytes,
            title,
            tags,
        },
    )
    .await?;
    Ok(Json(outcome))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> BookingResult<Json<SearchResponse>> {
    let results = state
        .database
        .documents
        .search_chunks(&query.query, query.limit.clamp(1, 50))?;
    Ok(Json(SearchResponse {
        query: query.query,
        results,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::build_router;
    use crate::api::test_support::*;
    use crate::booking_db::BookingDatabase;
    use crate::config::create_test_config;
    use crate::shared_state::AppState;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "salon-test-boundary";

    fn multipart_body(file_name: &str, content: &str, title: Option<&str>) -> String {
        let mut body = String::new();
        if let Some(title) = title {
            body.push_str(&format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{t}\r\n",
                b = BOUNDARY,
                t = title
            ));
        }
        body.push_str(&format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = file_name,
            c = content
        ));
        body
    }

    fn upload_app(upload_dir: &std::path::Path) -> axum::Router {
        let mut config = create_test_config();
        config.upload_dir = upload_dir.to_path_buf();
        let database = Arc::new(BookingDatabase::new_in_memory().unwrap());
        build_router(AppState::new(config, database, None))
    }

    async fn upload(app: &axum::Router, body: String) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/knowledge/documents/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_upload_then_search() {
        let dir = tempfile::tempdir().unwrap();
        let app = upload_app(dir.path());

        let (status, outcome) = upload(
            &app,
            multipart_body(
                "aftercare.txt",
                "Aftercare: avoid water for two hours",
                Some("Aftercare Guide"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["success"], true);
        assert_eq!(outcome["status"], "ready");
        let id = outcome["document_id"].as_i64().unwrap();

        let (status, found) = send(&app, Method::GET, "/api/v1/knowledge/search?query=AFTERCARE", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["query"], "AFTERCARE");
        assert_eq!(found["results"][0]["document_title"], "Aftercare Guide");

        let (_, chunks) = send(&app, Method::GET, &format!("/api/v1/knowledge/documents/{}/chunks", id), None).await;
        assert_eq!(chunks.as_array().unwrap().len(), 1);

        let (status, deleted) = send(&app, Method::DELETE, &format!("/api/v1/knowledge/documents/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["message"], "Document deleted successfully");
        let (status, _) = send(&app, Method::GET, &format!("/api/v1/knowledge/documents/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_type() {
        let dir = tempfile::tempdir().unwrap();
        let app = upload_app(dir.path());
        let (status, body) = upload(&app, multipart_body("photo.png", "not text", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("not supported"));
    }

    #[tokio::test]
    async fn test_legacy_doc_is_kept_with_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let app = upload_app(dir.path());
        let (status, outcome) = upload(&app, multipart_body("old.doc", "binary", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["status"], "error");

        let id = outcome["document_id"].as_i64().unwrap();
        let (_, document) = send(&app, Method::GET, &format!("/api/v1/knowledge/documents/{}", id), None).await;
        assert_eq!(document["status"], "error");
        assert!(document["error_message"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_update_and_list_documents() {
        let dir = tempfile::tempdir().unwrap();
        let app = upload_app(dir.path());
        let (_, outcome) = upload(&app, multipart_body("policy.txt", "Deposits are refundable", None)).await;
        let id = outcome["document_id"].as_i64().unwrap();

        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/knowledge/documents/{}", id),
            Some(serde_json::json!({"title": "Deposit Policy", "tags": "policy"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Deposit Policy");

        let (_, listed) = send(&app, Method::GET, "/api/v1/knowledge/documents?search=deposit", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert!(listed[0].get("file_path").is_none());

        let (status, _) = send(&app, Method::GET, "/api/v1/knowledge/search?query=", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
