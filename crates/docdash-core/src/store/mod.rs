//! Document Store abstraction.
//!
//! The [`DocumentStore`] trait is the only way the engines touch pipeline
//! data: aggregate counts for the status reader, per-document reads for
//! browsing and review, and the two attribute writes the review engine is
//! allowed to make.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Chunk, ChunkCounts, Classification, Document, DocumentCounts, DocumentSummary,
    ExtractedAttribute,
};

/// What a bulk review write does to each matching attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkUpdate {
    /// Keep the extracted value, set confidence to 1.0. A previously
    /// denied row keeps its NULL value and still counts.
    Approve,
    /// Null the value, set confidence to 0.0.
    Deny,
}

impl BulkUpdate {
    pub fn confidence(&self) -> f64 {
        match self {
            BulkUpdate::Approve => 1.0,
            BulkUpdate::Deny => 0.0,
        }
    }
}

/// A bulk write failed after `applied` rows were already updated.
///
/// Transactional stores roll back and report `applied == 0`.
#[derive(Debug, Error)]
#[error("bulk update stopped after {applied} row(s): {source}")]
pub struct BulkWriteError {
    pub applied: u64,
    #[source]
    pub source: anyhow::Error,
}

/// Abstract Document Store backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`document_counts`](DocumentStore::document_counts) | Totals by lifecycle status |
/// | [`extracted_document_count`](DocumentStore::extracted_document_count) | Documents with ≥1 attribute |
/// | [`chunk_counts`](DocumentStore::chunk_counts) | Chunk total and chunked documents |
/// | [`raw_class_counts`](DocumentStore::raw_class_counts) | Counts per raw classification value |
/// | [`list_attributes`](DocumentStore::list_attributes) | Attributes of one document, by name |
/// | [`set_attribute`](DocumentStore::set_attribute) | Atomic (value, confidence) write |
/// | [`set_attributes_below`](DocumentStore::set_attributes_below) | Bulk review write |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn document_counts(&self) -> Result<DocumentCounts>;

    async fn extracted_document_count(&self) -> Result<i64>;

    async fn chunk_counts(&self) -> Result<ChunkCounts>;

    /// Document count per raw classification value, unnormalized.
    async fn raw_class_counts(&self) -> Result<Vec<(String, i64)>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn get_classification(&self, document_id: &str) -> Result<Option<Classification>>;

    /// Classified documents, newest classification first.
    async fn recent_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>>;

    /// All attributes of a document, ordered by name.
    async fn list_attributes(&self, document_id: &str) -> Result<Vec<ExtractedAttribute>>;

    /// Chunks of a document ordered by index, optionally truncated.
    async fn list_chunks(&self, document_id: &str, limit: Option<usize>) -> Result<Vec<Chunk>>;

    /// Write `value` and `confidence` together in a single row update.
    ///
    /// Returns `false` when no attribute `name` exists on the document.
    async fn set_attribute(
        &self,
        document_id: &str,
        name: &str,
        value: Option<&str>,
        confidence: f64,
    ) -> Result<bool>;

    /// Apply `update` to every scored attribute of the document whose
    /// confidence is strictly below `threshold`, returning the row count.
    ///
    /// The default implementation issues one [`set_attribute`] per row and
    /// is not all-or-nothing: a failure part-way reports how many rows were
    /// already written. Stores with multi-row transactions should override it.
    ///
    /// [`set_attribute`]: DocumentStore::set_attribute
    async fn set_attributes_below(
        &self,
        document_id: &str,
        threshold: f64,
        update: BulkUpdate,
    ) -> std::result::Result<u64, BulkWriteError> {
        let attributes = self
            .list_attributes(document_id)
            .await
            .map_err(|source| BulkWriteError { applied: 0, source })?;

        let mut applied = 0u64;
        for attr in attributes
            .iter()
            .filter(|a| a.confidence.is_some_and(|c| c < threshold))
        {
            let value = match update {
                BulkUpdate::Approve => attr.value.as_deref(),
                BulkUpdate::Deny => None,
            };
            match self
                .set_attribute(document_id, &attr.name, value, update.confidence())
                .await
            {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(source) => return Err(BulkWriteError { applied, source }),
            }
        }
        Ok(applied)
    }
}
