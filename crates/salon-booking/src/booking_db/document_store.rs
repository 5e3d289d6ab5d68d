use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use tracing::{debug, info};

use crate::booking_db::schema::*;
use crate::error::{BookingError, BookingResult};
use crate::utils::TextUtils;

const DOCUMENT_COLUMNS: &str = "id, title, file_name, file_type, file_size, file_path, content, tags, \
     status, error_message, is_active, created_at, updated_at";

fn document_from_row(row: &Row) -> rusqlite::Result<KnowledgeDocument> {
    Ok(KnowledgeDocument {
        id: row.get(0)?,
        title: row.get(1)?,
        file_name: row.get(2)?,
        file_type: row.get(3)?,
        file_size: row.get(4)?,
        file_path: row.get(5)?,
        content: row.get(6)?,
        tags: row.get(7)?,
        status: document_status_col(row, 8)?,
        error_message: row.get(9)?,
        is_active: row.get(10)?,
        created_at: timestamp_col(row, 11)?,
        updated_at: timestamp_col(row, 12)?,
    })
}

fn fetch_active(conn: &Connection, id: i64) -> rusqlite::Result<Option<KnowledgeDocument>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM knowledge_documents WHERE id = ?1 AND is_active = 1",
            DOCUMENT_COLUMNS
        ),
        [id],
        document_from_row,
    )
    .optional()
}

fn not_found() -> BookingError {
    BookingError::not_found("Document not found")
}

/// Case-insensitive `LIKE` pattern matching `query` literally. Pair with `ESCAPE '\'`.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn insert_chunks(conn: &Connection, document_id: i64, chunks: &[String]) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM document_chunks WHERE document_id = ?1", [document_id])?;
    let now = now_timestamp();
    let mut stmt = conn.prepare(
        "INSERT INTO document_chunks (document_id, content, chunk_index, tokens, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (index, chunk) in chunks.iter().enumerate() {
        stmt.execute(params![
            document_id,
            chunk,
            index as i64,
            TextUtils::count_words(chunk) as i64,
            now
        ])?;
    }
    Ok(())
}

/// Knowledge documents and their searchable chunks.
pub struct DocumentStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl DocumentStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> BookingResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Insert a new document row in `processing`.
    pub fn create(&self, new: NewDocument) -> BookingResult<KnowledgeDocument> {
        let conn = self.get_conn()?;
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO knowledge_documents
             (title, file_name, file_type, file_size, file_path, content, tags, status, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, '', ?6, ?7, 1, ?8, ?8)",
            params![
                new.title,
                new.file_name,
                new.file_type,
                new.file_size,
                new.file_path,
                new.tags,
                DocumentStatus::Processing.as_str(),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!("Created knowledge document {} ({})", id, new.file_name);
        fetch_active(&conn, id)?.ok_or_else(not_found)
    }

    pub fn get(&self, id: i64) -> BookingResult<KnowledgeDocument> {
        let conn = self.get_conn()?;
        fetch_active(&conn, id)?.ok_or_else(not_found)
    }

    /// Active documents, newest first, optionally filtered by title, content or tags.
    pub fn list(
        &self,
        search: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> BookingResult<Vec<KnowledgeDocument>> {
        let conn = self.get_conn()?;
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let documents = match search {
            Some(term) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM knowledge_documents
                     WHERE is_active = 1
                       AND (casefold(title) LIKE ?1 ESCAPE '\\'
                            OR casefold(content) LIKE ?1 ESCAPE '\\'
                            OR casefold(tags) LIKE ?1 ESCAPE '\\')
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2 OFFSET ?3",
                    DOCUMENT_COLUMNS
                ))?;
                let rows = stmt.query_map(
                    params![like_pattern(term), limit as i64, skip as i64],
                    document_from_row,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM knowledge_documents
                     WHERE is_active = 1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?1 OFFSET ?2",
                    DOCUMENT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit as i64, skip as i64], document_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(documents)
    }

    /// Apply the fields present in `update` to an active document.
    pub fn update(&self, id: i64, update: DocumentUpdate) -> BookingResult<KnowledgeDocument> {
        if matches!(update.title.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(BookingError::invalid("Document title must not be empty"));
        }
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = fetch_active(&tx, id)?.ok_or_else(not_found)?;

        tx.execute(
            "UPDATE knowledge_documents
             SET title = ?1, tags = ?2, status = ?3, content = ?4, error_message = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                update.title.map(|t| t.trim().to_string()).unwrap_or(current.title),
                update.tags.or(current.tags),
                update.status.unwrap_or(current.status).as_str(),
                update.content.or(current.content),
                update.error_message.or(current.error_message),
                now_timestamp(),
                id,
            ],
        )?;
        let updated = fetch_active(&tx, id)?.ok_or_else(not_found)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Store extracted text and its chunks, and mark the document `ready`.
    pub fn mark_ready(&self, id: i64, content: &str, chunks: &[String]) -> BookingResult<KnowledgeDocument> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        fetch_active(&tx, id)?.ok_or_else(not_found)?;
        tx.execute(
            "UPDATE knowledge_documents
             SET content = ?1, status = ?2, error_message = NULL, updated_at = ?3
             WHERE id = ?4",
            params![content, DocumentStatus::Ready.as_str(), now_timestamp(), id],
        )?;
        insert_chunks(&tx, id, chunks)?;
        let updated = fetch_active(&tx, id)?.ok_or_else(not_found)?;
        tx.commit()?;
        info!("Document {} ready with {} chunks", id, chunks.len());
        Ok(updated)
    }

    pub fn mark_error(&self, id: i64, message: &str) -> BookingResult<KnowledgeDocument> {
        self.update(
            id,
            DocumentUpdate {
                status: Some(DocumentStatus::Error),
                error_message: Some(message.to_string()),
                ..Default::default()
            },
        )
    }

    /// Soft delete. The row and its chunks stay but drop out of every listing and search.
    pub fn soft_delete(&self, id: i64) -> BookingResult<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE knowledge_documents SET is_active = 0, updated_at = ?1 WHERE id = ?2 AND is_active = 1",
            params![now_timestamp(), id],
        )?;
        if changed == 0 {
            return Err(not_found());
        }
        info!("Deactivated knowledge document {}", id);
        Ok(())
    }

    /// Replace all chunks of a document without touching its status.
    #[cfg(test)]
    pub(crate) fn replace_chunks(&self, id: i64, chunks: &[String]) -> BookingResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        fetch_active(&tx, id)?.ok_or_else(not_found)?;
        insert_chunks(&tx, id, chunks)?;
        tx.commit()?;
        Ok(chunks.len())
    }

    pub fn list_chunks(&self, id: i64) -> BookingResult<Vec<DocumentChunk>> {
        let conn = self.get_conn()?;
        fetch_active(&conn, id)?.ok_or_else(not_found)?;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, content, chunk_index, tokens, created_at
             FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_index",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok(DocumentChunk {
                id: row.get(0)?,
                document_id: row.get(1)?,
                content: row.get(2)?,
                chunk_index: row.get(3)?,
                tokens: row.get(4)?,
                created_at: timestamp_col(row, 5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Chunks containing `query` (case-insensitive) from active, ready documents.
    pub fn search_chunks(&self, query: &str, limit: usize) -> BookingResult<Vec<ChunkMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(BookingError::invalid("Search query cannot be empty"));
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.id, d.title, c.content, c.chunk_index
             FROM document_chunks c
             JOIN knowledge_documents d ON d.id = c.document_id
             WHERE d.is_active = 1
               AND d.status = 'ready'
               AND casefold(c.content) LIKE ?1 ESCAPE '\\'
             ORDER BY d.id, c.chunk_index
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![like_pattern(query), limit as i64], |row| {
            Ok(ChunkMatch {
                document_id: row.get(0)?,
                document_title: row.get(1)?,
                content: row.get(2)?,
                chunk_index: row.get(3)?,
            })
        })?;
        let matches = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("Knowledge search '{}' matched {} chunks", query, matches.len());
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking_db::BookingDatabase;

    fn new_doc(title: &str) -> NewDocument {
        NewDocument {
            title: title.into(),
            file_name: format!("{}.txt", title.to_lowercase()),
            file_type: ".txt".into(),
            file_size: 42,
            file_path: format!("/tmp/{}.txt", title.to_lowercase()),
            tags: Some("care,tips".into()),
        }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Aftercare"), "%aftercare%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_search_only_sees_ready_documents() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let doc = db.documents.create(new_doc("Aftercare")).unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);

        db.documents
            .replace_chunks(doc.id, &["Aftercare: avoid water for two hours".to_string()])
            .unwrap();
        assert!(db.documents.search_chunks("aftercare", 5).unwrap().is_empty());

        db.documents
            .mark_ready(
                doc.id,
                "Aftercare: avoid water for two hours",
                &["Aftercare: avoid water for two hours".to_string()],
            )
            .unwrap();
        let hits = db.documents.search_chunks("aftercare", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_title, "Aftercare");
        assert_eq!(hits[0].chunk_index, 0);
    }

    #[test]
    fn test_search_is_case_insensitive_and_literal() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let doc = db.documents.create(new_doc("Promos")).unwrap();
        db.documents
            .mark_ready(
                doc.id,
                "",
                &[
                    "Tuesday deal: 50% off gel polish".to_string(),
                    "Chăm sóc móng sau khi sơn GEL".to_string(),
                    "Weekend 500 off".to_string(),
                ],
            )
            .unwrap();

        assert_eq!(db.documents.search_chunks("50%", 5).unwrap().len(), 1);
        assert_eq!(db.documents.search_chunks("CHĂM SÓC", 5).unwrap().len(), 1);
        assert_eq!(db.documents.search_chunks("gel", 5).unwrap().len(), 2);
        assert_eq!(db.documents.search_chunks("gel", 1).unwrap().len(), 1);
        assert!(matches!(
            db.documents.search_chunks("   ", 5),
            Err(BookingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_soft_delete_hides_document_everywhere() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let doc = db.documents.create(new_doc("Pricing")).unwrap();
        db.documents
            .mark_ready(doc.id, "Gel polish price list", &["Gel polish price list".to_string()])
            .unwrap();

        db.documents.soft_delete(doc.id).unwrap();
        assert!(matches!(db.documents.get(doc.id), Err(BookingError::NotFound(_))));
        assert!(db.documents.list(None, 0, 100).unwrap().is_empty());
        assert!(db.documents.search_chunks("gel", 5).unwrap().is_empty());
        assert!(matches!(db.documents.soft_delete(doc.id), Err(BookingError::NotFound(_))));
    }

    #[test]
    fn test_list_search_over_title_content_and_tags() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let a = db.documents.create(new_doc("Aftercare")).unwrap();
        db.documents.mark_ready(a.id, "Avoid hot water", &[]).unwrap();
        let mut pricing = new_doc("Pricing");
        pricing.tags = Some("menu".into());
        db.documents.create(pricing).unwrap();

        assert_eq!(db.documents.list(None, 0, 100).unwrap().len(), 2);
        assert_eq!(db.documents.list(Some("after"), 0, 100).unwrap().len(), 1);
        assert_eq!(db.documents.list(Some("HOT WATER"), 0, 100).unwrap().len(), 1);
        assert_eq!(db.documents.list(Some("menu"), 0, 100).unwrap().len(), 1);
        assert_eq!(db.documents.list(Some(""), 0, 100).unwrap().len(), 2);
        assert_eq!(db.documents.list(None, 1, 100).unwrap().len(), 1);
    }

    #[test]
    fn test_update_and_mark_error() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let doc = db.documents.create(new_doc("Policy")).unwrap();
        let updated = db
            .documents
            .update(
                doc.id,
                DocumentUpdate {
                    title: Some("Cancellation policy".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "Cancellation policy");
        assert_eq!(updated.tags.as_deref(), Some("care,tips"));

        let failed = db.documents.mark_error(doc.id, "unsupported legacy .doc").unwrap();
        assert_eq!(failed.status, DocumentStatus::Error);
        assert_eq!(failed.error_message.as_deref(), Some("unsupported legacy .doc"));
    }

    #[test]
    fn test_chunks_are_replaced_with_word_counts() {
        let db = BookingDatabase::new_in_memory().unwrap();
        let doc = db.documents.create(new_doc("Faq")).unwrap();
        db.documents
            .replace_chunks(doc.id, &["one two three".to_string(), "four".to_string()])
            .unwrap();
        db.documents
            .replace_chunks(doc.id, &["five six".to_string()])
            .unwrap();
        let chunks = db.documents.list_chunks(doc.id).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].tokens, 2);
        assert_eq!(chunks[0].chunk_index, 0);
    }
}
