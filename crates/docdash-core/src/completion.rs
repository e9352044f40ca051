//! Text completion abstraction.
//!
//! A completion service turns one prompt into one answer. It is called at
//! most once per question, with a bounded wait, and never retried.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{ConsoleError, ErrorKind};

#[derive(Debug, Error)]
pub enum CompletionError {
    /// No completion backend is configured or it refused the connection.
    #[error("completion service unavailable: {0}")]
    Unavailable(String),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion failed: {0}")]
    Failed(#[source] anyhow::Error),
}

impl ConsoleError for CompletionError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}
