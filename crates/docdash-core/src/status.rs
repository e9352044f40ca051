//! Pipeline status reader.
//!
//! Aggregates per-stage counts from the [`DocumentStore`] into a
//! [`PipelineStatusSnapshot`] using three independent queries. A failed
//! query blanks only its own group of counts and is reported alongside
//! the snapshot; the reader never fails as a whole.
//!
//! Results are reused for a bounded window through a [`StatusCache`]
//! owned by the caller's session, not by the reader. Only complete
//! snapshots are cached, so a transient failure is retried on the next
//! read instead of being pinned for the whole window.
//!
//! Counts are read without a shared transaction: while the pipeline is
//! running, totals can be momentarily incoherent with each other.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::error::{ConsoleError, ErrorKind};
use crate::label::{is_error_label, normalize_class_label};
use crate::models::{ClassCount, PipelineStatusSnapshot};
use crate::store::DocumentStore;

pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_CLASSES_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
#[error("status query `{query}` failed: {source}")]
pub struct StatusError {
    pub query: &'static str,
    #[source]
    pub source: anyhow::Error,
}

impl ConsoleError for StatusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    stored_at: Instant,
}

/// Per-session cache for status reads.
#[derive(Debug, Clone)]
pub struct StatusCache {
    snapshot_ttl: Duration,
    classes_ttl: Duration,
    snapshot: Option<Cached<PipelineStatusSnapshot>>,
    classes: Option<Cached<Vec<ClassCount>>>,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TTL, DEFAULT_CLASSES_TTL)
    }
}

impl StatusCache {
    pub fn new(snapshot_ttl: Duration, classes_ttl: Duration) -> Self {
        Self {
            snapshot_ttl,
            classes_ttl,
            snapshot: None,
            classes: None,
        }
    }

    /// Drop everything; the next read goes to the store.
    pub fn invalidate(&mut self) {
        self.snapshot = None;
        self.classes = None;
    }

    fn fresh<'a, T>(entry: &'a Option<Cached<T>>, ttl: Duration) -> Option<&'a T> {
        entry
            .as_ref()
            .filter(|c| c.stored_at.elapsed() < ttl)
            .map(|c| &c.value)
    }
}

/// Result of a status read: the snapshot plus any sub-query failures.
#[derive(Debug)]
pub struct StatusRead {
    pub snapshot: PipelineStatusSnapshot,
    pub errors: Vec<StatusError>,
    /// Served from the session cache without touching the store.
    pub cached: bool,
}

impl StatusRead {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.snapshot.is_complete()
    }
}

pub struct StatusReader {
    store: Arc<dyn DocumentStore>,
}

impl StatusReader {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Current snapshot, from `cache` when still inside its window.
    pub async fn snapshot(&self, cache: &mut StatusCache) -> StatusRead {
        if let Some(snapshot) = StatusCache::fresh(&cache.snapshot, cache.snapshot_ttl) {
            tracing::debug!("status snapshot served from cache");
            return StatusRead {
                snapshot: snapshot.clone(),
                errors: Vec::new(),
                cached: true,
            };
        }

        let read = self.read_snapshot().await;
        if read.is_complete() {
            cache.snapshot = Some(Cached {
                value: read.snapshot.clone(),
                stored_at: Instant::now(),
            });
        } else {
            for err in &read.errors {
                tracing::warn!(query = err.query, error = %err.source, "status query failed");
            }
        }
        read
    }

    /// Invalidate the session cache and recompute.
    pub async fn refresh(&self, cache: &mut StatusCache) -> StatusRead {
        cache.invalidate();
        self.snapshot(cache).await
    }

    /// Document counts per normalized class label, excluding failed
    /// classifications, largest first.
    pub async fn class_breakdown(
        &self,
        cache: &mut StatusCache,
    ) -> Result<Vec<ClassCount>, StatusError> {
        if let Some(classes) = StatusCache::fresh(&cache.classes, cache.classes_ttl) {
            tracing::debug!("class breakdown served from cache");
            return Ok(classes.clone());
        }

        let raw = self
            .store
            .raw_class_counts()
            .await
            .map_err(|source| StatusError {
                query: "class_breakdown",
                source,
            })?;
        let classes = merge_class_counts(raw);
        cache.classes = Some(Cached {
            value: classes.clone(),
            stored_at: Instant::now(),
        });
        Ok(classes)
    }

    async fn read_snapshot(&self) -> StatusRead {
        let mut snapshot = PipelineStatusSnapshot::empty(chrono::Utc::now().timestamp());
        let mut errors = Vec::new();

        match self.store.document_counts().await {
            Ok(counts) => snapshot.documents = Some(counts),
            Err(source) => errors.push(StatusError {
                query: "document_counts",
                source,
            }),
        }
        match self.store.extracted_document_count().await {
            Ok(n) => snapshot.extracted_documents = Some(n),
            Err(source) => errors.push(StatusError {
                query: "extracted_documents",
                source,
            }),
        }
        match self.store.chunk_counts().await {
            Ok(counts) => snapshot.chunks = Some(counts),
            Err(source) => errors.push(StatusError {
                query: "chunk_counts",
                source,
            }),
        }

        StatusRead {
            snapshot,
            errors,
            cached: false,
        }
    }
}

fn merge_class_counts(raw: Vec<(String, i64)>) -> Vec<ClassCount> {
    let mut merged: BTreeMap<String, i64> = BTreeMap::new();
    for (raw_label, count) in raw {
        if is_error_label(&raw_label) {
            continue;
        }
        *merged.entry(normalize_class_label(&raw_label)).or_insert(0) += count;
    }
    let mut classes: Vec<ClassCount> = merged
        .into_iter()
        .map(|(label, count)| ClassCount { label, count })
        .collect();
    classes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Classification, Document, DocumentType, LifecycleStatus};
    use crate::store::memory::InMemoryStore;
    use crate::store::testing::InstrumentedStore;
    use std::sync::atomic::Ordering;

    fn store_with(docs: &[(&str, LifecycleStatus, &str)]) -> Arc<InstrumentedStore> {
        let inner = InMemoryStore::new();
        for (i, (id, status, class)) in docs.iter().enumerate() {
            inner.insert_document(Document {
                id: id.to_string(),
                file_name: format!("{}.pdf", id),
                file_path: format!("s3://docs/{}.pdf", id),
                file_size: None,
                document_type: DocumentType::Pdf,
                status: *status,
                content_text: None,
            });
            inner.insert_classification(Classification {
                document_id: id.to_string(),
                raw_label: class.to_string(),
                classified_at: i as i64,
            });
            inner.insert_chunk(Chunk {
                document_id: id.to_string(),
                chunk_index: 0,
                text: "text".into(),
                size: 4,
            });
        }
        Arc::new(InstrumentedStore::new(inner))
    }

    #[tokio::test]
    async fn test_snapshot_counts() {
        let store = store_with(&[
            ("a", LifecycleStatus::Parsed, "invoice"),
            ("b", LifecycleStatus::Classified, "invoice"),
            ("c", LifecycleStatus::ClassificationError, "ERR_TIMEOUT"),
        ]);
        let reader = StatusReader::new(store.clone());
        let mut cache = StatusCache::default();

        let read = reader.snapshot(&mut cache).await;
        assert!(read.is_complete());
        let docs = read.snapshot.documents.unwrap();
        assert_eq!(docs.total, 3);
        assert_eq!(docs.count(LifecycleStatus::Parsed), 1);
        assert_eq!(docs.count(LifecycleStatus::ClassificationError), 1);
        assert_eq!(read.snapshot.chunks.unwrap().chunked_documents, 3);
        assert_eq!(read.snapshot.extracted_documents, Some(0));
    }

    #[tokio::test]
    async fn test_snapshot_reused_within_window() {
        let store = store_with(&[("a", LifecycleStatus::Parsed, "invoice")]);
        let reader = StatusReader::new(store.clone());
        let mut cache = StatusCache::default();

        let first = reader.snapshot(&mut cache).await;
        let calls = store.aggregate_calls.load(Ordering::SeqCst);
        let second = reader.snapshot(&mut cache).await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.snapshot, second.snapshot);
        assert_eq!(store.aggregate_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_snapshot_requeried_after_window() {
        let store = store_with(&[("a", LifecycleStatus::Parsed, "invoice")]);
        let reader = StatusReader::new(store.clone());
        let mut cache = StatusCache::new(Duration::ZERO, Duration::ZERO);

        reader.snapshot(&mut cache).await;
        let calls = store.aggregate_calls.load(Ordering::SeqCst);
        let again = reader.snapshot(&mut cache).await;

        assert!(!again.cached);
        assert_eq!(store.aggregate_calls.load(Ordering::SeqCst), calls * 2);
    }

    #[tokio::test]
    async fn test_refresh_forces_new_query() {
        let store = store_with(&[("a", LifecycleStatus::Parsed, "invoice")]);
        let reader = StatusReader::new(store.clone());
        let mut cache = StatusCache::default();

        reader.snapshot(&mut cache).await;
        let calls = store.aggregate_calls.load(Ordering::SeqCst);
        let refreshed = reader.refresh(&mut cache).await;

        assert!(!refreshed.cached);
        assert!(store.aggregate_calls.load(Ordering::SeqCst) > calls);
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_and_not_cached() {
        let store = store_with(&[("a", LifecycleStatus::Parsed, "invoice")]);
        store.fail_read("extracted_document_count");
        let reader = StatusReader::new(store.clone());
        let mut cache = StatusCache::default();

        let read = reader.snapshot(&mut cache).await;
        assert!(!read.is_complete());
        assert_eq!(read.errors.len(), 1);
        assert_eq!(read.errors[0].query, "extracted_documents");
        assert_eq!(read.errors[0].kind(), ErrorKind::Transient);
        assert!(read.snapshot.documents.is_some());
        assert!(read.snapshot.extracted_documents.is_none());
        assert!(read.snapshot.chunks.is_some());

        store.heal();
        let healed = reader.snapshot(&mut cache).await;
        assert!(!healed.cached);
        assert!(healed.is_complete());
    }

    #[tokio::test]
    async fn test_total_failure_yields_empty_snapshot() {
        let store = store_with(&[]);
        store.fail_read("document_counts");
        store.fail_read("extracted_document_count");
        store.fail_read("chunk_counts");
        let reader = StatusReader::new(store);
        let mut cache = StatusCache::default();

        let read = reader.snapshot(&mut cache).await;
        assert!(read.snapshot.is_empty());
        assert_eq!(read.errors.len(), 3);
    }

    #[tokio::test]
    async fn test_class_breakdown_normalizes_and_skips_errors() {
        let store = store_with(&[
            ("a", LifecycleStatus::Classified, "invoice"),
            ("b", LifecycleStatus::Classified, r#"{"labels": ["invoice"]}"#),
            ("c", LifecycleStatus::Classified, "contract"),
            ("d", LifecycleStatus::ClassificationError, "classification_error"),
            ("e", LifecycleStatus::ClassificationError, "ERR_PARSE"),
        ]);
        let reader = StatusReader::new(store.clone());
        let mut cache = StatusCache::default();

        let classes = reader.class_breakdown(&mut cache).await.unwrap();
        assert_eq!(
            classes,
            vec![
                ClassCount {
                    label: "invoice".into(),
                    count: 2
                },
                ClassCount {
                    label: "contract".into(),
                    count: 1
                },
            ]
        );

        reader.class_breakdown(&mut cache).await.unwrap();
        assert_eq!(store.class_calls.load(Ordering::SeqCst), 1);
    }
}
