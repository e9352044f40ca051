//! Load a JSON export of pipeline rows into the SQLite mirror.
//!
//! ```json
//! {
//!   "documents": [{"id": "d1", "file_name": "inv.pdf", "file_path": "s3://b/inv.pdf",
//!                  "status": "chunked"}],
//!   "classifications": [{"document_id": "d1", "document_class": {"labels": ["invoice"]}}],
//!   "extractions": [{"document_id": "d1", "attribute_name": "invoice_total",
//!                    "attribute_value": "12,062", "confidence_score": 0.42}],
//!   "chunks": [{"document_id": "d1", "chunk_index": 0, "chunk_text": "..."}]
//! }
//! ```
//!
//! Every row is an upsert, so importing the same file twice is harmless.
//! Chunks are replaced per document so the FTS index never holds stale text.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use docdash_core::models::{
    Chunk, Classification, Document, DocumentType, ExtractedAttribute, LifecycleStatus,
};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Deserialize, Default)]
pub struct ExportFile {
    #[serde(default)]
    pub documents: Vec<DocumentRow>,
    #[serde(default)]
    pub classifications: Vec<ClassificationRow>,
    #[serde(default)]
    pub extractions: Vec<ExtractionRow>,
    #[serde(default)]
    pub chunks: Vec<ChunkRow>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRow {
    #[serde(default)]
    pub id: Option<String>,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub content_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassificationRow {
    pub document_id: String,
    /// Either a plain label or the classifier's structured output.
    pub document_class: serde_json::Value,
    #[serde(default)]
    pub classified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractionRow {
    pub document_id: String,
    pub attribute_name: String,
    #[serde(default)]
    pub attribute_value: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub extracted_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkRow {
    pub document_id: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    #[serde(default)]
    pub chunk_size: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub documents: usize,
    pub classifications: usize,
    pub extractions: usize,
    pub chunks: usize,
}

impl DocumentRow {
    fn into_document(self) -> Result<Document> {
        let document_type = match self.document_type.as_deref() {
            Some(t) => t.parse()?,
            None => DocumentType::from_file_name(&self.file_name),
        };
        let status = match self.status.as_deref() {
            Some(s) => s.parse()?,
            None => LifecycleStatus::New,
        };
        Ok(Document {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            file_name: self.file_name,
            file_path: self.file_path,
            file_size: self.file_size,
            document_type,
            status,
            content_text: self.content_text,
        })
    }
}

fn raw_label(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Rows of an export converted to the core model, all validated.
struct PreparedImport {
    documents: Vec<Document>,
    classifications: Vec<Classification>,
    attributes: Vec<ExtractedAttribute>,
    chunks: BTreeMap<String, Vec<Chunk>>,
}

/// Parse and range-check every row. Nothing touches the store here, so a
/// bad row anywhere in the file leaves the mirror as it was.
fn prepare(export: ExportFile, now: i64) -> Result<PreparedImport> {
    let documents = export
        .documents
        .into_iter()
        .map(DocumentRow::into_document)
        .collect::<Result<Vec<_>>>()?;

    let classifications = export
        .classifications
        .into_iter()
        .map(|row| Classification {
            document_id: row.document_id,
            raw_label: raw_label(row.document_class),
            classified_at: row.classified_at.unwrap_or(now),
        })
        .collect();

    let mut attributes = Vec::with_capacity(export.extractions.len());
    for row in export.extractions {
        if let Some(c) = row.confidence_score {
            if !(0.0..=1.0).contains(&c) {
                bail!(
                    "confidence_score {} out of range for {} on {}",
                    c,
                    row.attribute_name,
                    row.document_id
                );
            }
        }
        attributes.push(ExtractedAttribute {
            document_id: row.document_id,
            name: row.attribute_name,
            value: row.attribute_value,
            confidence: row.confidence_score,
            extracted_at: row.extracted_at.unwrap_or(now),
        });
    }

    let mut chunks: BTreeMap<String, Vec<Chunk>> = BTreeMap::new();
    for row in export.chunks {
        let size = row
            .chunk_size
            .unwrap_or(row.chunk_text.chars().count() as i64);
        chunks.entry(row.document_id.clone()).or_default().push(Chunk {
            document_id: row.document_id,
            chunk_index: row.chunk_index,
            text: row.chunk_text,
            size,
        });
    }
    for list in chunks.values_mut() {
        list.sort_by_key(|c| c.chunk_index);
    }

    Ok(PreparedImport {
        documents,
        classifications,
        attributes,
        chunks,
    })
}

/// Write every row of `export` through `store`. The whole file is
/// validated before the first write.
pub async fn import_rows(store: &SqliteStore, export: ExportFile) -> Result<ImportSummary> {
    let prepared = prepare(export, chrono::Utc::now().timestamp())?;
    let mut summary = ImportSummary::default();

    for doc in &prepared.documents {
        store.upsert_document(doc).await?;
        summary.documents += 1;
    }
    for classification in &prepared.classifications {
        store.upsert_classification(classification).await?;
        summary.classifications += 1;
    }
    for attribute in &prepared.attributes {
        store.upsert_attribute(attribute).await?;
        summary.extractions += 1;
    }
    for (document_id, chunks) in &prepared.chunks {
        store.replace_chunks(document_id, chunks).await?;
        summary.chunks += chunks.len();
    }

    Ok(summary)
}

/// CLI entry point: `docdash import <file>`.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read export file: {}", path.display()))?;
    let export: ExportFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse export file: {}", path.display()))?;

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool.clone());
    let summary = import_rows(&store, export).await?;
    pool.close().await;

    tracing::info!(?summary, file = %path.display(), "import finished");
    println!("imported documents: {}", summary.documents);
    println!("imported classifications: {}", summary.classifications);
    println!("imported extractions: {}", summary.extractions);
    println!("imported chunks: {}", summary.chunks);
    println!("ok");
    Ok(())
}
