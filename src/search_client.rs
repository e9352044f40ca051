//! HTTP client for a remote search service.
//!
//! `POST {endpoint}/services/{service}/query` with
//!
//! ```json
//! {"query": "...", "columns": ["chunk_id", ...], "limit": 5,
//!  "filter": {"@eq": {"document_class": "invoice"}}}
//! ```
//!
//! and expects `{"results": [{...}, ...]}` in relevance order. The status
//! code decides the error kind: 404 means the service does not exist,
//! 5xx and connection failures mean it is unavailable. Results are
//! returned in the order received. No retries.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docdash_core::search::{
    SearchError, SearchRecord, SearchRequest, SearchService, SEARCH_COLUMNS,
};

pub struct HttpSearchClient {
    client: reqwest::Client,
    endpoint: String,
    service: String,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    columns: &'a [&'a str],
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<SearchRecord>,
}

impl HttpSearchClient {
    pub fn new(endpoint: &str, service: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            service: service.to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/services/{}/query", self.endpoint, self.service)
    }
}

#[async_trait]
impl SearchService for HttpSearchClient {
    async fn search(&self, req: &SearchRequest<'_>) -> Result<Vec<SearchRecord>, SearchError> {
        let body = QueryBody {
            query: req.query,
            columns: &SEARCH_COLUMNS,
            limit: req.limit,
            filter: req
                .class_filter
                .map(|class| serde_json::json!({ "@eq": { "document_class": class } })),
        };

        tracing::debug!(service = %self.service, limit = req.limit, "querying search service");
        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    SearchError::Unavailable(format!("{}: {}", self.service, e))
                } else {
                    SearchError::Failed(e.into())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SearchError::ServiceNotFound(self.service.clone()));
        }
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Unavailable(format!(
                "{} returned {}: {}",
                self.service, status, text
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Failed(anyhow!(
                "search service error {}: {}",
                status,
                text
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Failed(anyhow!("invalid search response: {}", e)))?;
        let mut results = parsed.results;
        results.truncate(req.limit);
        Ok(results)
    }
}
