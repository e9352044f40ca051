//! Explicit per-reviewer session context.
//!
//! Everything that would otherwise be ambient UI state (the status cache,
//! the conversation, the reviewer's chosen threshold, class filter and
//! result limit) lives here and is passed into each operation.

use crate::answer::{self, AnswerError, DEFAULT_RESULT_LIMIT};
use crate::chat::{ChatHistory, DEFAULT_CHAT_MEMORY};
use crate::error::check_unit_interval;
use crate::review::{ReviewError, DEFAULT_REVIEW_THRESHOLD};
use crate::status::StatusCache;

#[derive(Debug, Clone)]
pub struct Session {
    pub status_cache: StatusCache,
    pub chat: ChatHistory,
    review_threshold: f64,
    class_filter: Option<String>,
    result_limit: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(StatusCache::default(), DEFAULT_CHAT_MEMORY)
    }
}

impl Session {
    pub fn new(status_cache: StatusCache, chat_memory: usize) -> Self {
        Self {
            status_cache,
            chat: ChatHistory::new(chat_memory),
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            class_filter: None,
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }

    pub fn review_threshold(&self) -> f64 {
        self.review_threshold
    }

    pub fn set_review_threshold(&mut self, threshold: f64) -> Result<(), ReviewError> {
        if !check_unit_interval(threshold) {
            return Err(ReviewError::InvalidThreshold(threshold));
        }
        self.review_threshold = threshold;
        Ok(())
    }

    pub fn class_filter(&self) -> Option<&str> {
        self.class_filter.as_deref()
    }

    /// `None`, a blank string, or `All` searches all classes.
    pub fn set_class_filter(&mut self, class: Option<&str>) {
        self.class_filter = class
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
            .map(str::to_string);
    }

    pub fn result_limit(&self) -> usize {
        self.result_limit
    }

    pub fn set_result_limit(&mut self, limit: usize) -> Result<(), AnswerError> {
        answer::validate_limit(limit)?;
        self.result_limit = limit;
        Ok(())
    }
}
