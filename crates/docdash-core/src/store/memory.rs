//! In-memory [`DocumentStore`] and [`SearchService`] for tests and demos.
//!
//! Uses `BTreeMap`s behind `std::sync::RwLock`. Keyword search counts
//! query-term occurrences per chunk; there is no real index.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::label::{is_error_label, normalize_class_label};
use crate::models::{
    Chunk, ChunkCounts, Classification, Document, DocumentCounts, DocumentSummary,
    ExtractedAttribute,
};
use crate::search::{SearchError, SearchRecord, SearchRequest, SearchService};

use super::DocumentStore;

/// In-memory Document Store.
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<BTreeMap<String, Document>>,
    classifications: RwLock<HashMap<String, Classification>>,
    /// Keyed by (document id, attribute name) so iteration is name-ordered.
    attributes: RwLock<BTreeMap<(String, String), ExtractedAttribute>>,
    chunks: RwLock<BTreeMap<(String, i64), Chunk>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&self, doc: Document) {
        write(&self.documents).insert(doc.id.clone(), doc);
    }

    /// Latest classification wins.
    pub fn insert_classification(&self, classification: Classification) {
        write(&self.classifications).insert(classification.document_id.clone(), classification);
    }

    pub fn insert_attribute(&self, attr: ExtractedAttribute) {
        write(&self.attributes).insert((attr.document_id.clone(), attr.name.clone()), attr);
    }

    pub fn insert_chunk(&self, chunk: Chunk) {
        write(&self.chunks).insert((chunk.document_id.clone(), chunk.chunk_index), chunk);
    }

    pub fn attribute(&self, document_id: &str, name: &str) -> Option<ExtractedAttribute> {
        read(&self.attributes)
            .get(&(document_id.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn document_counts(&self) -> Result<DocumentCounts> {
        let docs = read(&self.documents);
        let mut counts = DocumentCounts {
            total: docs.len() as i64,
            by_status: BTreeMap::new(),
        };
        for doc in docs.values() {
            *counts.by_status.entry(doc.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn extracted_document_count(&self) -> Result<i64> {
        let attrs = read(&self.attributes);
        let mut ids: Vec<&str> = attrs.keys().map(|(doc, _)| doc.as_str()).collect();
        ids.dedup();
        Ok(ids.len() as i64)
    }

    async fn chunk_counts(&self) -> Result<ChunkCounts> {
        let chunks = read(&self.chunks);
        let mut ids: Vec<&str> = chunks.keys().map(|(doc, _)| doc.as_str()).collect();
        ids.dedup();
        Ok(ChunkCounts {
            total_chunks: chunks.len() as i64,
            chunked_documents: ids.len() as i64,
        })
    }

    async fn raw_class_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for c in read(&self.classifications).values() {
            *counts.entry(c.raw_label.clone()).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(read(&self.documents).get(id).cloned())
    }

    async fn get_classification(&self, document_id: &str) -> Result<Option<Classification>> {
        Ok(read(&self.classifications).get(document_id).cloned())
    }

    async fn recent_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        let docs = read(&self.documents);
        let mut rows: Vec<DocumentSummary> = read(&self.classifications)
            .values()
            .filter_map(|c| {
                docs.get(&c.document_id).map(|d| DocumentSummary {
                    document_id: d.id.clone(),
                    file_name: d.file_name.clone(),
                    file_path: d.file_path.clone(),
                    document_class: c.label(),
                    status: d.status,
                    document_type: d.document_type,
                    classified_at: c.classified_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.classified_at
                .cmp(&a.classified_at)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_attributes(&self, document_id: &str) -> Result<Vec<ExtractedAttribute>> {
        Ok(read(&self.attributes)
            .values()
            .filter(|a| a.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_chunks(&self, document_id: &str, limit: Option<usize>) -> Result<Vec<Chunk>> {
        Ok(read(&self.chunks)
            .values()
            .filter(|c| c.document_id == document_id)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn set_attribute(
        &self,
        document_id: &str,
        name: &str,
        value: Option<&str>,
        confidence: f64,
    ) -> Result<bool> {
        let mut attrs = write(&self.attributes);
        match attrs.get_mut(&(document_id.to_string(), name.to_string())) {
            Some(attr) => {
                attr.value = value.map(str::to_string);
                attr.confidence = Some(confidence);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SearchService for InMemoryStore {
    async fn search(&self, req: &SearchRequest<'_>) -> Result<Vec<SearchRecord>, SearchError> {
        let query = req.query.to_lowercase();
        let terms: Vec<&str> = query.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let docs = read(&self.documents);
        let classes = read(&self.classifications);
        let mut scored: Vec<(usize, SearchRecord)> = read(&self.chunks)
            .values()
            .filter_map(|chunk| {
                let text = chunk.text.to_lowercase();
                let matches = terms.iter().filter(|t| text.contains(*t)).count();
                if matches == 0 {
                    return None;
                }
                let doc = docs.get(&chunk.document_id)?;
                let class = classes
                    .get(&chunk.document_id)
                    .filter(|c| !is_error_label(&c.raw_label))
                    .map(|c| normalize_class_label(&c.raw_label))
                    .unwrap_or_default();
                if req.class_filter.is_some_and(|f| f != class) {
                    return None;
                }
                Some((
                    matches,
                    SearchRecord {
                        chunk_id: format!("{}#{}", chunk.document_id, chunk.chunk_index),
                        document_id: chunk.document_id.clone(),
                        file_name: doc.file_name.clone(),
                        file_path: doc.file_path.clone(),
                        document_class: class,
                        chunk_index: chunk.chunk_index,
                        chunk_text: chunk.text.clone(),
                    },
                ))
            })
            .collect();

        // Stable: ties keep (document, chunk index) order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(req.limit)
            .map(|(_, record)| record)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, LifecycleStatus};

    fn seed() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (id, class) in [("d1", "invoice"), ("d2", r#"{"labels": ["contract"]}"#)] {
            store.insert_document(Document {
                id: id.into(),
                file_name: format!("{}.pdf", id),
                file_path: format!("s3://bucket/{}.pdf", id),
                file_size: Some(1024),
                document_type: DocumentType::Pdf,
                status: LifecycleStatus::Chunked,
                content_text: None,
            });
            store.insert_classification(Classification {
                document_id: id.into(),
                raw_label: class.into(),
                classified_at: 100,
            });
        }
        store.insert_chunk(Chunk {
            document_id: "d1".into(),
            chunk_index: 0,
            text: "Invoice total due: 12,062".into(),
            size: 25,
        });
        store.insert_chunk(Chunk {
            document_id: "d2".into(),
            chunk_index: 0,
            text: "The contract total is stated in the appendix".into(),
            size: 44,
        });
        store
    }

    #[tokio::test]
    async fn test_search_orders_by_term_matches() {
        let store = seed();
        let req = SearchRequest {
            query: "invoice total",
            class_filter: None,
            limit: 5,
        };
        let hits = store.search(&req).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, "d1");
        assert_eq!(hits[1].document_class, "contract");
    }

    #[tokio::test]
    async fn test_search_class_filter_is_exact() {
        let store = seed();
        let req = SearchRequest {
            query: "total",
            class_filter: Some("contract"),
            limit: 5,
        };
        let hits = store.search(&req).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "d2");
    }

    #[tokio::test]
    async fn test_counts() {
        let store = seed();
        let counts = store.document_counts().await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.count(LifecycleStatus::Chunked), 2);
        let chunks = store.chunk_counts().await.unwrap();
        assert_eq!(chunks.total_chunks, 2);
        assert_eq!(chunks.chunked_documents, 2);
        assert_eq!(store.extracted_document_count().await.unwrap(), 0);
    }
}
