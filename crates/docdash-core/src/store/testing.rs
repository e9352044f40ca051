//! Test double that wraps [`InMemoryStore`] with call counting and
//! injectable failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{
    Chunk, ChunkCounts, Classification, Document, DocumentCounts, DocumentSummary,
    ExtractedAttribute,
};

use super::memory::InMemoryStore;
use super::DocumentStore;

#[derive(Default)]
pub(crate) struct InstrumentedStore {
    pub inner: InMemoryStore,
    pub aggregate_calls: AtomicUsize,
    pub class_calls: AtomicUsize,
    /// Names of read operations that should fail.
    pub failing_reads: Mutex<Vec<&'static str>>,
    /// Successful attribute writes allowed before every further write fails.
    pub writes_before_failure: Mutex<Option<usize>>,
}

impl InstrumentedStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_read(&self, op: &'static str) {
        self.failing_reads.lock().unwrap().push(op);
    }

    pub fn heal(&self) {
        self.failing_reads.lock().unwrap().clear();
        *self.writes_before_failure.lock().unwrap() = None;
    }

    pub fn fail_writes_after(&self, n: usize) {
        *self.writes_before_failure.lock().unwrap() = Some(n);
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if self.failing_reads.lock().unwrap().contains(&op) {
            bail!("injected failure in {}", op);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InstrumentedStore {
    async fn document_counts(&self) -> Result<DocumentCounts> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        self.check("document_counts")?;
        self.inner.document_counts().await
    }

    async fn extracted_document_count(&self) -> Result<i64> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        self.check("extracted_document_count")?;
        self.inner.extracted_document_count().await
    }

    async fn chunk_counts(&self) -> Result<ChunkCounts> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        self.check("chunk_counts")?;
        self.inner.chunk_counts().await
    }

    async fn raw_class_counts(&self) -> Result<Vec<(String, i64)>> {
        self.class_calls.fetch_add(1, Ordering::SeqCst);
        self.check("raw_class_counts")?;
        self.inner.raw_class_counts().await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.check("get_document")?;
        self.inner.get_document(id).await
    }

    async fn get_classification(&self, document_id: &str) -> Result<Option<Classification>> {
        self.inner.get_classification(document_id).await
    }

    async fn recent_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        self.inner.recent_documents(limit).await
    }

    async fn list_attributes(&self, document_id: &str) -> Result<Vec<ExtractedAttribute>> {
        self.check("list_attributes")?;
        self.inner.list_attributes(document_id).await
    }

    async fn list_chunks(&self, document_id: &str, limit: Option<usize>) -> Result<Vec<Chunk>> {
        self.inner.list_chunks(document_id, limit).await
    }

    async fn set_attribute(
        &self,
        document_id: &str,
        name: &str,
        value: Option<&str>,
        confidence: f64,
    ) -> Result<bool> {
        {
            let mut budget = self.writes_before_failure.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    bail!("injected write failure on {}/{}", document_id, name);
                }
                *remaining -= 1;
            }
        }
        self.inner
            .set_attribute(document_id, name, value, confidence)
            .await
    }
}
