//! Retrieve-then-generate question answering.
//!
//! One call to [`AnswerEngine::answer`] is one search round trip followed by
//! at most one completion call:
//!
//! 1. Validate the result limit (`1..=20`).
//! 2. Search for the top `limit` chunks, optionally restricted to one class.
//! 3. Zero hits short-circuits to [`NO_RELEVANT_DOCUMENTS`] with no sources.
//! 4. Format each hit as a context entry, in the order returned, keeping
//!    entries while the context fits in `max_context_chars`.
//! 5. Embed question and context in a fixed template and complete it.
//!
//! The engine is stateless. Conversation history lives in
//! [`ChatHistory`](crate::chat::ChatHistory), owned by the caller.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::completion::{CompletionError, CompletionService};
use crate::error::{ConsoleError, ErrorKind};
use crate::search::{SearchError, SearchRecord, SearchRequest, SearchService};

pub const MIN_RESULT_LIMIT: usize = 1;
pub const MAX_RESULT_LIMIT: usize = 20;
pub const DEFAULT_RESULT_LIMIT: usize = 5;
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

pub const NO_RELEVANT_DOCUMENTS: &str = "I couldn't find any relevant documents to answer your question. Please try rephrasing your query or check if documents have been processed.";

const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("result limit must be between 1 and 20, got {0}")]
    InvalidLimit(usize),
    #[error("question is empty")]
    EmptyQuestion,
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl ConsoleError for AnswerError {
    fn kind(&self) -> ErrorKind {
        match self {
            AnswerError::InvalidLimit(_) | AnswerError::EmptyQuestion => ErrorKind::Validation,
            AnswerError::Search(e) => e.kind(),
            AnswerError::Completion(e) => e.kind(),
        }
    }
}

/// A chunk that was sent to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerSource {
    pub document_id: String,
    pub file_name: String,
    pub document_class: String,
    pub chunk_index: i64,
    pub chunk_text: String,
}

impl From<&SearchRecord> for AnswerSource {
    fn from(r: &SearchRecord) -> Self {
        Self {
            document_id: r.document_id.clone(),
            file_name: r.file_name.clone(),
            document_class: r.document_class.clone(),
            chunk_index: r.chunk_index,
            chunk_text: r.chunk_text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer_text: String,
    /// In search relevance order.
    pub sources: Vec<AnswerSource>,
    /// Hits left out of the context because of the size cap.
    pub dropped_chunks: usize,
}

impl Answer {
    pub fn no_results() -> Self {
        Self {
            answer_text: NO_RELEVANT_DOCUMENTS.to_string(),
            sources: Vec::new(),
            dropped_chunks: 0,
        }
    }
}

/// The context block actually sent, and how many hits it includes.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBlock {
    pub text: String,
    pub included: usize,
}

fn format_entry(record: &SearchRecord) -> String {
    format!(
        "Document: {} (Class: {})\nContent: {}",
        record.file_name, record.document_class, record.chunk_text
    )
}

/// Join hits into a context of at most `max_chars` characters.
///
/// Entries are taken in rank order until the next one does not fit. If the
/// top entry alone is too long it is cut at a character boundary.
pub fn build_context(records: &[SearchRecord], max_chars: usize) -> ContextBlock {
    let mut text = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for record in records {
        let entry = format_entry(record);
        let entry_chars = entry.chars().count();

        if included == 0 {
            if entry_chars > max_chars {
                text = entry.chars().take(max_chars).collect();
                included = 1;
                break;
            }
            text.push_str(&entry);
            used = entry_chars;
            included = 1;
            continue;
        }

        let needed = CONTEXT_SEPARATOR.len() + entry_chars;
        if used + needed > max_chars {
            break;
        }
        text.push_str(CONTEXT_SEPARATOR);
        text.push_str(&entry);
        used += needed;
        included += 1;
    }

    ContextBlock { text, included }
}

/// Fixed instruction template around the question and context.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful document analysis assistant. Answer the user's question based on the provided document context.\n\
         \n\
         Question: {question}\n\
         \n\
         Document Context:\n\
         {context}\n\
         \n\
         Instructions:\n\
         - Provide a clear, concise answer based on the document content\n\
         - If the answer isn't in the documents, say so clearly\n\
         - Reference specific documents when relevant\n\
         - Be helpful and informative\n\
         \n\
         Answer:"
    )
}

pub fn validate_limit(limit: usize) -> Result<(), AnswerError> {
    if (MIN_RESULT_LIMIT..=MAX_RESULT_LIMIT).contains(&limit) {
        Ok(())
    } else {
        Err(AnswerError::InvalidLimit(limit))
    }
}

pub struct AnswerEngine {
    search: Arc<dyn SearchService>,
    completion: Arc<dyn CompletionService>,
    max_context_chars: usize,
}

impl AnswerEngine {
    pub fn new(
        search: Arc<dyn SearchService>,
        completion: Arc<dyn CompletionService>,
        max_context_chars: usize,
    ) -> Self {
        Self {
            search,
            completion,
            max_context_chars: max_context_chars.max(1),
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        class_filter: Option<&str>,
        limit: usize,
    ) -> Result<Answer, AnswerError> {
        validate_limit(limit)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(AnswerError::EmptyQuestion);
        }

        let class_filter = class_filter.map(str::trim).filter(|c| !c.is_empty());
        let request = SearchRequest {
            query: question,
            class_filter,
            limit,
        };
        let mut records = self.search.search(&request).await?;
        records.truncate(limit);
        tracing::debug!(hits = records.len(), ?class_filter, limit, "search completed");

        if records.is_empty() {
            return Ok(Answer::no_results());
        }

        let context = build_context(&records, self.max_context_chars);
        let dropped_chunks = records.len() - context.included;
        if dropped_chunks > 0 {
            tracing::warn!(
                dropped_chunks,
                max_context_chars = self.max_context_chars,
                "context cap reached, lowest-ranked chunks dropped"
            );
        }

        let prompt = build_prompt(question, &context.text);
        tracing::debug!(
            model = self.completion.model_name(),
            prompt_chars = prompt.chars().count(),
            "requesting completion"
        );
        let answer_text = self.completion.complete(&prompt).await?;

        Ok(Answer {
            answer_text,
            sources: records[..context.included]
                .iter()
                .map(AnswerSource::from)
                .collect(),
            dropped_chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedSearch {
        records: Vec<SearchRecord>,
        calls: AtomicUsize,
        last_filter: Mutex<Option<String>>,
    }

    impl FixedSearch {
        fn new(records: Vec<SearchRecord>) -> Arc<Self> {
            Arc::new(Self {
                records,
                calls: AtomicUsize::new(0),
                last_filter: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl SearchService for FixedSearch {
        async fn search(&self, req: &SearchRequest<'_>) -> Result<Vec<SearchRecord>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_filter.lock().unwrap() = req.class_filter.map(str::to_string);
            Ok(self.records.iter().take(req.limit).cloned().collect())
        }
    }

    struct MissingSearch;

    #[async_trait]
    impl SearchService for MissingSearch {
        async fn search(&self, _: &SearchRequest<'_>) -> Result<Vec<SearchRecord>, SearchError> {
            Err(SearchError::ServiceNotFound("document_search".into()))
        }
    }

    /// Ignores the requested limit and returns everything it holds.
    struct GreedySearch(Vec<SearchRecord>);

    #[async_trait]
    impl SearchService for GreedySearch {
        async fn search(&self, _: &SearchRequest<'_>) -> Result<Vec<SearchRecord>, SearchError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct EchoCompletion {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionService for EchoCompletion {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("The invoice total is 12,062.".to_string())
        }
    }

    fn record(doc: &str, index: i64, text: &str) -> SearchRecord {
        SearchRecord {
            chunk_id: format!("{}#{}", doc, index),
            document_id: doc.into(),
            file_name: format!("{}.pdf", doc),
            file_path: format!("s3://docs/{}.pdf", doc),
            document_class: "invoice".into(),
            chunk_index: index,
            chunk_text: text.into(),
        }
    }

    #[tokio::test]
    async fn test_single_match_yields_one_source() {
        let search = FixedSearch::new(vec![record("inv-1", 0, "Invoice total: 12,062")]);
        let completion = Arc::new(EchoCompletion::default());
        let engine = AnswerEngine::new(search, completion.clone(), DEFAULT_MAX_CONTEXT_CHARS);

        let answer = engine
            .answer("What is the invoice total?", None, 5)
            .await
            .unwrap();

        assert!(!answer.answer_text.is_empty());
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].document_id, "inv-1");
        assert_eq!(answer.dropped_chunks, 0);

        let prompts = completion.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Question: What is the invoice total?"));
        assert!(prompts[0]
            .contains("Document: inv-1.pdf (Class: invoice)\nContent: Invoice total: 12,062"));
    }

    #[tokio::test]
    async fn test_empty_index_short_circuits() {
        let search = FixedSearch::new(Vec::new());
        let completion = Arc::new(EchoCompletion::default());
        let engine = AnswerEngine::new(search, completion.clone(), DEFAULT_MAX_CONTEXT_CHARS);

        let answer = engine
            .answer("What is the invoice total?", None, 5)
            .await
            .unwrap();

        assert_eq!(answer.answer_text, NO_RELEVANT_DOCUMENTS);
        assert!(answer.sources.is_empty());
        assert!(completion.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_validated_before_search() {
        let search = FixedSearch::new(vec![record("inv-1", 0, "x")]);
        let engine = AnswerEngine::new(
            search.clone(),
            Arc::new(EchoCompletion::default()),
            DEFAULT_MAX_CONTEXT_CHARS,
        );

        for bad in [0, 21] {
            let err = engine.answer("total?", None, bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_class_filter_passed_through() {
        let search = FixedSearch::new(vec![record("inv-1", 0, "x")]);
        let engine = AnswerEngine::new(
            search.clone(),
            Arc::new(EchoCompletion::default()),
            DEFAULT_MAX_CONTEXT_CHARS,
        );
        engine.answer("total?", Some("invoice"), 3).await.unwrap();
        assert_eq!(search.last_filter.lock().unwrap().as_deref(), Some("invoice"));

        engine.answer("total?", Some("  "), 3).await.unwrap();
        assert_eq!(*search.last_filter.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_service_not_found_is_distinct_from_empty() {
        let engine = AnswerEngine::new(
            Arc::new(MissingSearch),
            Arc::new(EchoCompletion::default()),
            DEFAULT_MAX_CONTEXT_CHARS,
        );
        let err = engine.answer("total?", None, 5).await.unwrap_err();
        assert!(matches!(err, AnswerError::Search(SearchError::ServiceNotFound(_))));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_context_cap_drops_lowest_ranked() {
        let search = FixedSearch::new(vec![
            record("a", 0, &"a".repeat(100)),
            record("b", 0, &"b".repeat(100)),
            record("c", 0, &"c".repeat(100)),
        ]);
        let completion = Arc::new(EchoCompletion::default());
        let entry_len = format_entry(&record("a", 0, &"a".repeat(100))).len();
        let engine = AnswerEngine::new(search, completion.clone(), entry_len * 2 + 2);

        let answer = engine.answer("letters", None, 5).await.unwrap();
        let ids: Vec<_> = answer.sources.iter().map(|s| s.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(answer.dropped_chunks, 1);
        assert!(!completion.prompts.lock().unwrap()[0].contains("ccc"));
    }

    #[tokio::test]
    async fn test_results_beyond_limit_are_not_used() {
        let records = (0..6).map(|i| record(&format!("d{}", i), 0, "total")).collect();
        let completion = Arc::new(EchoCompletion::default());
        let engine = AnswerEngine::new(
            Arc::new(GreedySearch(records)),
            completion.clone(),
            DEFAULT_MAX_CONTEXT_CHARS,
        );

        let answer = engine.answer("total?", None, 2).await.unwrap();
        let ids: Vec<_> = answer.sources.iter().map(|s| s.document_id.as_str()).collect();
        assert_eq!(ids, vec!["d0", "d1"]);
        assert_eq!(answer.dropped_chunks, 0);
        assert!(!completion.prompts.lock().unwrap()[0].contains("d2.pdf"));
    }

    #[test]
    fn test_oversized_first_chunk_truncated_on_char_boundary() {
        let block = build_context(&[record("a", 0, &"é".repeat(50))], 40);
        assert_eq!(block.included, 1);
        assert_eq!(block.text.chars().count(), 40);
    }

    #[test]
    fn test_prompt_keeps_quotes_verbatim() {
        let prompt = build_prompt("What's the \"total\"?", "ctx");
        assert!(prompt.contains("Question: What's the \"total\"?"));
        assert!(prompt.ends_with("Answer:"));
    }
}
