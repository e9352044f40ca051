//! SQLite-backed [`DocumentStore`] and [`SearchService`].
//!
//! The SQLite file is a local mirror of the Document Store, filled by
//! [`import`](crate::import) or by whatever job exports pipeline rows.
//! Keyword search runs against the `chunks_fts` FTS5 table.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use docdash_core::label::{is_error_label, normalize_class_label};
use docdash_core::models::{
    Chunk, ChunkCounts, Classification, Document, DocumentCounts, DocumentSummary, DocumentType,
    ExtractedAttribute, LifecycleStatus,
};
use docdash_core::search::{SearchError, SearchRecord, SearchRequest, SearchService};
use docdash_core::store::{BulkUpdate, BulkWriteError, DocumentStore};

/// SQLite implementation of the store and search traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, file_name, file_path, file_size, document_type,
                                   status, content_text, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                file_name = excluded.file_name,
                file_path = excluded.file_path,
                file_size = excluded.file_size,
                document_type = excluded.document_type,
                status = excluded.status,
                content_text = excluded.content_text
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.file_name)
        .bind(&doc.file_path)
        .bind(doc.file_size)
        .bind(doc.document_type.as_str())
        .bind(doc.status.as_str())
        .bind(&doc.content_text)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert document {}", doc.id))?;
        Ok(())
    }

    /// Latest classification wins.
    pub async fn upsert_classification(&self, c: &Classification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_classifications (document_id, document_class, classified_at)
            VALUES (?, ?, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                document_class = excluded.document_class,
                classified_at = excluded.classified_at
            "#,
        )
        .bind(&c.document_id)
        .bind(&c.raw_label)
        .bind(c.classified_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert classification for {}", c.document_id))?;
        Ok(())
    }

    pub async fn upsert_attribute(&self, a: &ExtractedAttribute) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_extractions (document_id, attribute_name, attribute_value,
                                              confidence_score, extracted_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id, attribute_name) DO UPDATE SET
                attribute_value = excluded.attribute_value,
                confidence_score = excluded.confidence_score,
                extracted_at = excluded.extracted_at
            "#,
        )
        .bind(&a.document_id)
        .bind(&a.name)
        .bind(&a.value)
        .bind(a.confidence)
        .bind(a.extracted_at)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to upsert attribute {} on {}",
                a.name, a.document_id
            )
        })?;
        Ok(())
    }

    /// Replace all chunks of a document, keeping the FTS index in step.
    pub async fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO document_chunks (document_id, chunk_index, chunk_text, chunk_size) VALUES (?, ?, ?, ?)",
            )
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.size)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (document_id, chunk_index, text) VALUES (?, ?, ?)")
                .bind(document_id)
                .bind(chunk.chunk_index)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let document_type: String = row.get("document_type");
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        file_name: row.get("file_name"),
        file_path: row.get("file_path"),
        file_size: row.get("file_size"),
        document_type: DocumentType::from_str(&document_type).unwrap_or(DocumentType::Other),
        status: LifecycleStatus::from_str(&status)?,
        content_text: row.get("content_text"),
    })
}

fn attribute_from_row(row: &SqliteRow) -> ExtractedAttribute {
    ExtractedAttribute {
        document_id: row.get("document_id"),
        name: row.get("attribute_name"),
        value: row.get("attribute_value"),
        confidence: row.get("confidence_score"),
        extracted_at: row.get("extracted_at"),
    }
}

/// Quote each word of a natural-language question for FTS5 and OR them.
///
/// Punctuation such as `?` or `"` is FTS5 syntax, so it never reaches MATCH.
pub fn fts_query(question: &str) -> Option<String> {
    let terms: Vec<String> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn document_counts(&self) -> Result<DocumentCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM documents GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = DocumentCounts::default();
        for row in &rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            counts.total += n;
            match LifecycleStatus::from_str(&status) {
                Ok(s) => {
                    counts.by_status.insert(s, n);
                }
                Err(_) => tracing::warn!(%status, n, "documents with unknown status"),
            }
        }
        Ok(counts)
    }

    async fn extracted_document_count(&self) -> Result<i64> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT document_id) FROM document_extractions")
                .fetch_one(&self.pool)
                .await?;
        Ok(n)
    }

    async fn chunk_counts(&self) -> Result<ChunkCounts> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT document_id) AS docs FROM document_chunks",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(ChunkCounts {
            total_chunks: row.get("total"),
            chunked_documents: row.get("docs"),
        })
    }

    async fn raw_class_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT document_class, COUNT(*) AS n FROM document_classifications GROUP BY document_class",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("document_class"), r.get("n")))
            .collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, file_name, file_path, file_size, document_type, status, content_text FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn get_classification(&self, document_id: &str) -> Result<Option<Classification>> {
        let row = sqlx::query(
            "SELECT document_id, document_class, classified_at FROM document_classifications WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Classification {
            document_id: r.get("document_id"),
            raw_label: r.get("document_class"),
            classified_at: r.get("classified_at"),
        }))
    }

    async fn recent_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.file_name, d.file_path, d.file_size, d.document_type, d.status,
                   d.content_text, c.document_class, c.classified_at
            FROM document_classifications c
            JOIN documents d ON d.id = c.document_id
            ORDER BY c.classified_at DESC, d.id ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let doc = document_from_row(row)?;
                let raw: String = row.get("document_class");
                Ok(DocumentSummary {
                    document_id: doc.id,
                    file_name: doc.file_name,
                    file_path: doc.file_path,
                    document_class: normalize_class_label(&raw),
                    status: doc.status,
                    document_type: doc.document_type,
                    classified_at: row.get("classified_at"),
                })
            })
            .collect()
    }

    async fn list_attributes(&self, document_id: &str) -> Result<Vec<ExtractedAttribute>> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, attribute_name, attribute_value, confidence_score, extracted_at
            FROM document_extractions
            WHERE document_id = ?
            ORDER BY attribute_name ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(attribute_from_row).collect())
    }

    async fn list_chunks(&self, document_id: &str, limit: Option<usize>) -> Result<Vec<Chunk>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT document_id, chunk_index, chunk_text, chunk_size
            FROM document_chunks
            WHERE document_id = ?
            ORDER BY chunk_index ASC
            LIMIT ?
            "#,
        )
        .bind(document_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| Chunk {
                document_id: r.get("document_id"),
                chunk_index: r.get("chunk_index"),
                text: r.get("chunk_text"),
                size: r.get("chunk_size"),
            })
            .collect())
    }

    async fn set_attribute(
        &self,
        document_id: &str,
        name: &str,
        value: Option<&str>,
        confidence: f64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE document_extractions
            SET attribute_value = ?, confidence_score = ?
            WHERE document_id = ? AND attribute_name = ?
            "#,
        )
        .bind(value)
        .bind(confidence)
        .bind(document_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One UPDATE inside a transaction: all matching rows change or none do.
    async fn set_attributes_below(
        &self,
        document_id: &str,
        threshold: f64,
        update: BulkUpdate,
    ) -> std::result::Result<u64, BulkWriteError> {
        let sql = match update {
            BulkUpdate::Approve => {
                r#"
                UPDATE document_extractions
                SET confidence_score = ?
                WHERE document_id = ? AND confidence_score IS NOT NULL AND confidence_score < ?
                "#
            }
            BulkUpdate::Deny => {
                r#"
                UPDATE document_extractions
                SET attribute_value = NULL, confidence_score = ?
                WHERE document_id = ? AND confidence_score IS NOT NULL AND confidence_score < ?
                "#
            }
        };

        let run = async {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(sql)
                .bind(update.confidence())
                .bind(document_id)
                .bind(threshold)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok::<u64, sqlx::Error>(result.rows_affected())
        };

        run.await.map_err(|e| BulkWriteError {
            applied: 0,
            source: e.into(),
        })
    }
}

#[async_trait]
impl SearchService for SqliteStore {
    async fn search(&self, req: &SearchRequest<'_>) -> Result<Vec<SearchRecord>, SearchError> {
        let Some(fts) = fts_query(req.query) else {
            return Ok(Vec::new());
        };

        // The class filter compares normalized labels, which only exist in
        // Rust, so filtered searches read every match and cut afterwards.
        let sql_limit: i64 = if req.class_filter.is_some() {
            -1
        } else {
            req.limit as i64
        };

        let rows = sqlx::query(
            r#"
            SELECT chunks_fts.document_id AS document_id,
                   CAST(chunks_fts.chunk_index AS INTEGER) AS chunk_index,
                   chunks_fts.text AS text,
                   d.file_name, d.file_path, c.document_class
            FROM chunks_fts
            JOIN documents d ON d.id = chunks_fts.document_id
            LEFT JOIN document_classifications c ON c.document_id = chunks_fts.document_id
            WHERE chunks_fts MATCH ?
            ORDER BY chunks_fts.rank, chunks_fts.document_id, chunk_index
            LIMIT ?
            "#,
        )
        .bind(&fts)
        .bind(sql_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SearchError::Failed(e.into()))?;

        let records = rows
            .iter()
            .filter_map(|row| {
                let raw: Option<String> = row.get("document_class");
                let class = raw
                    .filter(|r| !is_error_label(r))
                    .map(|r| normalize_class_label(&r))
                    .unwrap_or_default();
                if req.class_filter.is_some_and(|f| f != class) {
                    return None;
                }
                let document_id: String = row.get("document_id");
                let chunk_index: i64 = row.get("chunk_index");
                Some(SearchRecord {
                    chunk_id: format!("{}#{}", document_id, chunk_index),
                    document_id,
                    file_name: row.get("file_name"),
                    file_path: row.get("file_path"),
                    document_class: class,
                    chunk_index,
                    chunk_text: row.get("text"),
                })
            })
            .take(req.limit)
            .collect();
        Ok(records)
    }
}
