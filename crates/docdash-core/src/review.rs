//! Confidence-gated extraction review.
//!
//! An extracted attribute is a review candidate when it is unscored or its
//! confidence is strictly below the reviewer's threshold. A reviewer either
//! approves a candidate (optionally correcting its value; confidence becomes
//! exactly 1.0) or denies it (value becomes null, confidence 0.0).
//!
//! Every single-attribute write updates value and confidence in one row
//! update, so no reader can observe a denied value with approved confidence.
//! There is no cross-reviewer locking: concurrent reviewers of the same
//! attribute resolve as last-writer-wins on the (value, confidence) pair.
//!
//! Bulk operations touch scored attributes below the threshold only.
//! Whether they are all-or-nothing depends on the store; a store without
//! multi-row transactions reports a partial application with its row count.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::error::{check_unit_interval, ConsoleError, ErrorKind};
use crate::models::ExtractedAttribute;
use crate::store::{BulkUpdate, DocumentStore};

pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.5;

/// Confidence assigned by an approval.
pub const APPROVED_CONFIDENCE: f64 = 1.0;
/// Confidence assigned by a denial.
pub const DENIED_CONFIDENCE: f64 = 0.0;

const CRITICAL_BELOW: f64 = 0.3;
const WARNING_BELOW: f64 = 0.4;

/// Presentation hint for how uncertain an attribute is.
///
/// Bands are not states: an attribute is a candidate or not depending
/// only on the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Unscored,
    /// Below 0.3.
    Critical,
    /// In [0.3, 0.4).
    Warning,
    /// In [0.4, threshold).
    Caution,
    /// At or above the threshold.
    Accepted,
}

impl ConfidenceBand {
    pub fn classify(confidence: Option<f64>, threshold: f64) -> Self {
        match confidence {
            None => ConfidenceBand::Unscored,
            Some(c) if c >= threshold => ConfidenceBand::Accepted,
            Some(c) if c < CRITICAL_BELOW => ConfidenceBand::Critical,
            Some(c) if c < WARNING_BELOW => ConfidenceBand::Warning,
            Some(_) => ConfidenceBand::Caution,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::Unscored => "unscored",
            ConfidenceBand::Critical => "critical",
            ConfidenceBand::Warning => "warning",
            ConfidenceBand::Caution => "caution",
            ConfidenceBand::Accepted => "accepted",
        }
    }
}

/// An attribute awaiting review, with its presentation band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewCandidate {
    #[serde(flatten)]
    pub attribute: ExtractedAttribute,
    pub band: ConfidenceBand,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("confidence threshold must be in [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("attribute `{attribute}` not found on document {document_id}")]
    AttributeNotFound {
        document_id: String,
        attribute: String,
    },

    #[error("review store error on document {document_id}{}: {source}", attribute_suffix(.attribute))]
    Store {
        document_id: String,
        attribute: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("bulk review on document {document_id} partially applied ({applied} row(s)): {source}")]
    PartiallyApplied {
        document_id: String,
        applied: u64,
        #[source]
        source: anyhow::Error,
    },
}

fn attribute_suffix(attribute: &Option<String>) -> String {
    attribute
        .as_deref()
        .map(|a| format!(" attribute `{}`", a))
        .unwrap_or_default()
}

impl ConsoleError for ReviewError {
    fn kind(&self) -> ErrorKind {
        match self {
            ReviewError::InvalidThreshold(_) => ErrorKind::Validation,
            ReviewError::DocumentNotFound { .. } | ReviewError::AttributeNotFound { .. } => {
                ErrorKind::NotFound
            }
            ReviewError::Store { .. } => ErrorKind::Transient,
            ReviewError::PartiallyApplied { .. } => ErrorKind::Partial,
        }
    }
}

impl ReviewError {
    /// Rows written before the failure, for partial bulk writes.
    pub fn applied(&self) -> Option<u64> {
        match self {
            ReviewError::PartiallyApplied { applied, .. } => Some(*applied),
            _ => None,
        }
    }
}

pub struct ReviewEngine {
    store: Arc<dyn DocumentStore>,
}

impl ReviewEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Attributes of `document_id` that are unscored or below `threshold`,
    /// ordered by attribute name.
    pub async fn list_review_candidates(
        &self,
        document_id: &str,
        threshold: f64,
    ) -> Result<Vec<ReviewCandidate>, ReviewError> {
        validate_threshold(threshold)?;
        let attributes = self.load_attributes(document_id).await?;
        Ok(attributes
            .into_iter()
            .filter(|a| a.needs_review(threshold))
            .map(|attribute| ReviewCandidate {
                band: ConfidenceBand::classify(attribute.confidence, threshold),
                attribute,
            })
            .collect())
    }

    /// All attributes of a document with their band relative to `threshold`.
    pub async fn list_attributes(
        &self,
        document_id: &str,
        threshold: f64,
    ) -> Result<Vec<ReviewCandidate>, ReviewError> {
        validate_threshold(threshold)?;
        let attributes = self.load_attributes(document_id).await?;
        Ok(attributes
            .into_iter()
            .map(|attribute| ReviewCandidate {
                band: ConfidenceBand::classify(attribute.confidence, threshold),
                attribute,
            })
            .collect())
    }

    /// Set the attribute to the reviewer's value with confidence 1.0.
    pub async fn approve(
        &self,
        document_id: &str,
        attribute: &str,
        corrected_value: &str,
    ) -> Result<(), ReviewError> {
        self.write(document_id, attribute, Some(corrected_value), APPROVED_CONFIDENCE)
            .await?;
        tracing::info!(document_id, attribute, "attribute approved");
        Ok(())
    }

    /// Null the attribute's value and set confidence to 0.0.
    pub async fn deny(&self, document_id: &str, attribute: &str) -> Result<(), ReviewError> {
        self.write(document_id, attribute, None, DENIED_CONFIDENCE)
            .await?;
        tracing::info!(document_id, attribute, "attribute denied");
        Ok(())
    }

    /// Accept every scored attribute below `threshold` as extracted.
    pub async fn bulk_approve(
        &self,
        document_id: &str,
        threshold: f64,
    ) -> Result<u64, ReviewError> {
        self.bulk(document_id, threshold, BulkUpdate::Approve).await
    }

    /// Deny every scored attribute below `threshold`.
    pub async fn bulk_deny(&self, document_id: &str, threshold: f64) -> Result<u64, ReviewError> {
        self.bulk(document_id, threshold, BulkUpdate::Deny).await
    }

    async fn load_attributes(
        &self,
        document_id: &str,
    ) -> Result<Vec<ExtractedAttribute>, ReviewError> {
        let attributes = self
            .store
            .list_attributes(document_id)
            .await
            .map_err(|source| store_error(document_id, None, source))?;
        if attributes.is_empty() {
            self.ensure_document(document_id).await?;
        }
        Ok(attributes)
    }

    async fn ensure_document(&self, document_id: &str) -> Result<(), ReviewError> {
        let doc = self
            .store
            .get_document(document_id)
            .await
            .map_err(|source| store_error(document_id, None, source))?;
        match doc {
            Some(_) => Ok(()),
            None => Err(ReviewError::DocumentNotFound {
                document_id: document_id.to_string(),
            }),
        }
    }

    async fn write(
        &self,
        document_id: &str,
        attribute: &str,
        value: Option<&str>,
        confidence: f64,
    ) -> Result<(), ReviewError> {
        let updated = self
            .store
            .set_attribute(document_id, attribute, value, confidence)
            .await
            .map_err(|source| store_error(document_id, Some(attribute), source))?;
        if !updated {
            self.ensure_document(document_id).await?;
            return Err(ReviewError::AttributeNotFound {
                document_id: document_id.to_string(),
                attribute: attribute.to_string(),
            });
        }
        Ok(())
    }

    async fn bulk(
        &self,
        document_id: &str,
        threshold: f64,
        update: BulkUpdate,
    ) -> Result<u64, ReviewError> {
        validate_threshold(threshold)?;
        match self
            .store
            .set_attributes_below(document_id, threshold, update)
            .await
        {
            Ok(0) => {
                self.ensure_document(document_id).await?;
                Ok(0)
            }
            Ok(applied) => {
                tracing::info!(document_id, threshold, ?update, applied, "bulk review applied");
                Ok(applied)
            }
            Err(err) if err.applied == 0 => Err(store_error(document_id, None, err.source)),
            Err(err) => {
                tracing::warn!(
                    document_id,
                    applied = err.applied,
                    error = %err.source,
                    "bulk review partially applied"
                );
                Err(ReviewError::PartiallyApplied {
                    document_id: document_id.to_string(),
                    applied: err.applied,
                    source: err.source,
                })
            }
        }
    }
}

fn validate_threshold(threshold: f64) -> Result<(), ReviewError> {
    if check_unit_interval(threshold) {
        Ok(())
    } else {
        Err(ReviewError::InvalidThreshold(threshold))
    }
}

fn store_error(document_id: &str, attribute: Option<&str>, source: anyhow::Error) -> ReviewError {
    ReviewError::Store {
        document_id: document_id.to_string(),
        attribute: attribute.map(str::to_string),
        source,
    }
}
