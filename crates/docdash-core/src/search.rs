//! External search index abstraction.
//!
//! The search index is an opaque collaborator: it receives the question,
//! an optional exact-match class filter, and a result limit, and returns
//! chunk records in relevance order. The order is preserved as-is; no
//! client-side re-ranking happens anywhere in the console.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ConsoleError, ErrorKind};

/// Columns requested from the search service for every hit.
pub const SEARCH_COLUMNS: [&str; 7] = [
    "chunk_id",
    "document_id",
    "file_name",
    "file_path",
    "document_class",
    "chunk_index",
    "chunk_text",
];

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Exact match on the normalized document class.
    pub class_filter: Option<&'a str>,
    pub limit: usize,
}

/// A chunk returned by the search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    #[serde(default)]
    pub chunk_id: String,
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub document_class: String,
    #[serde(default)]
    pub chunk_index: i64,
    #[serde(default)]
    pub chunk_text: String,
}

/// Search failures. Zero hits is *not* an error: it is `Ok(vec![])`.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The search service itself does not exist or is not accessible.
    #[error("search service not found: {0}")]
    ServiceNotFound(String),
    /// The service exists but could not be reached or answered with a server error.
    #[error("search service unavailable: {0}")]
    Unavailable(String),
    #[error("search failed: {0}")]
    Failed(#[source] anyhow::Error),
}

impl ConsoleError for SearchError {
    fn kind(&self) -> ErrorKind {
        match self {
            SearchError::ServiceNotFound(_) => ErrorKind::NotFound,
            SearchError::Unavailable(_) | SearchError::Failed(_) => ErrorKind::Transient,
        }
    }
}

#[async_trait]
pub trait SearchService: Send + Sync {
    /// Top `limit` chunks for the query, most relevant first.
    async fn search(&self, req: &SearchRequest<'_>) -> Result<Vec<SearchRecord>, SearchError>;
}
