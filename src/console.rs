//! The console façade: one object wiring the four engines to the
//! configured backends.
//!
//! CLI commands and the HTTP server both go through [`Console`]. Per-user
//! state (status cache, chat history, reviewer settings) is never stored
//! here; it lives in a [`Session`] that callers create with
//! [`Console::new_session`] and pass into each operation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

use docdash_core::answer::{Answer, AnswerEngine, AnswerError};
use docdash_core::chat::ANSWER_FAILED;
use docdash_core::completion::CompletionService;
use docdash_core::error::{ConsoleError, ErrorKind};
use docdash_core::models::{ClassCount, DocumentDetail, DocumentSummary};
use docdash_core::relay::{PipelineRelay, StageRunner};
use docdash_core::review::ReviewEngine;
use docdash_core::search::SearchService;
use docdash_core::session::Session;
use docdash_core::status::{StatusCache, StatusError, StatusRead, StatusReader};
use docdash_core::store::DocumentStore;

use crate::analytics::Analytics;
use crate::completion::create_completion;
use crate::config::Config;
use crate::procedures::create_runner;
use crate::search_client::HttpSearchClient;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// Chunks shown with a document detail unless the caller asks otherwise.
pub const DETAIL_CHUNK_PREVIEW: usize = 3;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ConsoleError for LookupError {
    fn kind(&self) -> ErrorKind {
        match self {
            LookupError::NotFound(_) => ErrorKind::NotFound,
            LookupError::Store(_) => ErrorKind::Transient,
        }
    }
}

pub struct Console {
    mirror: SqliteStore,
    store: Arc<dyn DocumentStore>,
    status: StatusReader,
    review: ReviewEngine,
    answer: AnswerEngine,
    relay: PipelineRelay,
    config: Config,
}

impl Console {
    /// Open the SQLite mirror and build every backend named in `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let mirror = SqliteStore::new(pool);

        let search: Arc<dyn SearchService> = match config.search.provider.as_str() {
            "http" => {
                let endpoint = config.search.endpoint.as_deref().unwrap_or_default();
                Arc::new(HttpSearchClient::new(
                    endpoint,
                    &config.search.service,
                    Duration::from_secs(config.search.timeout_secs),
                )?)
            }
            _ => Arc::new(mirror.clone()),
        };
        let completion = create_completion(&config.completion)?;
        let runner = create_runner(&config.pipeline)?;

        tracing::debug!(
            search = %config.search.provider,
            completion = completion.model_name(),
            runner = %config.pipeline.runner,
            "console opened"
        );
        Ok(Self::from_parts(mirror, search, completion, runner, config))
    }

    /// Assemble a console from explicit backends.
    pub fn from_parts(
        mirror: SqliteStore,
        search: Arc<dyn SearchService>,
        completion: Arc<dyn CompletionService>,
        runner: Arc<dyn StageRunner>,
        config: &Config,
    ) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(mirror.clone());
        Self {
            status: StatusReader::new(store.clone()),
            review: ReviewEngine::new(store.clone()),
            answer: AnswerEngine::new(search, completion, config.answer.max_context_chars),
            relay: PipelineRelay::new(runner),
            mirror,
            store,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mirror(&self) -> &SqliteStore {
        &self.mirror
    }

    pub fn review(&self) -> &ReviewEngine {
        &self.review
    }

    pub fn relay(&self) -> &PipelineRelay {
        &self.relay
    }

    pub fn analytics(&self) -> Analytics<'_> {
        Analytics::new(self.mirror.pool())
    }

    /// A status cache with the configured validity windows.
    pub fn new_status_cache(&self) -> StatusCache {
        StatusCache::new(
            Duration::from_secs(self.config.status.snapshot_ttl_secs),
            Duration::from_secs(self.config.status.classes_ttl_secs),
        )
    }

    /// A fresh session carrying the configured defaults.
    pub fn new_session(&self) -> Session {
        let mut session = Session::new(self.new_status_cache(), self.config.answer.chat_memory);
        // Both values were range-checked by config validation.
        if let Err(e) = session.set_review_threshold(self.config.review.default_threshold) {
            tracing::warn!(error = %e, "ignoring configured review threshold");
        }
        if let Err(e) = session.set_result_limit(self.config.answer.default_limit) {
            tracing::warn!(error = %e, "ignoring configured result limit");
        }
        session
    }

    pub async fn snapshot(&self, cache: &mut StatusCache) -> StatusRead {
        self.status.snapshot(cache).await
    }

    pub async fn refresh(&self, cache: &mut StatusCache) -> StatusRead {
        self.status.refresh(cache).await
    }

    pub async fn class_breakdown(
        &self,
        cache: &mut StatusCache,
    ) -> Result<Vec<ClassCount>, StatusError> {
        self.status.class_breakdown(cache).await
    }

    pub async fn recent_documents(
        &self,
        limit: usize,
    ) -> Result<Vec<DocumentSummary>, LookupError> {
        Ok(self.store.recent_documents(limit).await?)
    }

    /// Document, classification, attributes and (up to `chunk_limit`) chunks.
    pub async fn document_detail(
        &self,
        document_id: &str,
        chunk_limit: Option<usize>,
    ) -> Result<DocumentDetail, LookupError> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| LookupError::NotFound(document_id.to_string()))?;
        let classification = self.store.get_classification(document_id).await?;
        let attributes = self.store.list_attributes(document_id).await?;
        let chunks = self.store.list_chunks(document_id, chunk_limit).await?;

        Ok(DocumentDetail {
            document,
            document_class: classification.as_ref().map(|c| c.label()),
            classified_at: classification.map(|c| c.classified_at),
            attributes,
            chunks,
        })
    }

    /// One conversational turn: record the question, answer it with the
    /// session's filter and limit, and record the reply.
    pub async fn ask(&self, session: &mut Session, question: &str) -> Result<Answer, AnswerError> {
        session.chat.push_user(question);
        let result = self
            .answer
            .answer(question, session.class_filter(), session.result_limit())
            .await;
        match &result {
            Ok(answer) => session.chat.push_assistant(answer.answer_text.clone()),
            Err(e) => {
                tracing::warn!(error = %e, "answering failed");
                session.chat.push_assistant(ANSWER_FAILED);
            }
        }
        result
    }

    /// Stateless answer for callers without a conversation (HTTP).
    pub async fn answer(
        &self,
        question: &str,
        class_filter: Option<&str>,
        limit: usize,
    ) -> Result<Answer, AnswerError> {
        self.answer.answer(question, class_filter, limit).await
    }
}
