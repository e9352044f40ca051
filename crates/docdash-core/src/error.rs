//! Error taxonomy shared by every engine.
//!
//! Each engine has its own `thiserror` enum; all of them map onto
//! [`ErrorKind`] so frontends can decide how to render a failure (and
//! whether a manual retry makes sense) without inspecting message text.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network or service failure. Safe to retry manually.
    Transient,
    /// Document, attribute, or service does not exist. Do not retry.
    NotFound,
    /// Input rejected before any external call was made.
    Validation,
    /// A multi-row write was only partly applied.
    Partial,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Partial => "partial",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Partial)
    }
}

/// Implemented by every engine error.
pub trait ConsoleError: std::error::Error + Send + Sync + 'static {
    fn kind(&self) -> ErrorKind;
}

/// Reject a threshold outside `[0, 1]` (NaN included).
pub(crate) fn check_unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}
