//! Core data models for the document pipeline.
//!
//! Documents, classifications, extracted attributes, and chunks mirror the
//! rows written by the external pipeline stages. The count and snapshot
//! types are derived aggregates and are never persisted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Detected file type of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Png,
    Jpg,
    Tiff,
    Docx,
    Pptx,
    Html,
    Txt,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Png => "png",
            DocumentType::Jpg => "jpg",
            DocumentType::Tiff => "tiff",
            DocumentType::Docx => "docx",
            DocumentType::Pptx => "pptx",
            DocumentType::Html => "html",
            DocumentType::Txt => "txt",
            DocumentType::Other => "other",
        }
    }

    /// Infer the type from a file name's extension. Unknown or missing
    /// extensions map to [`DocumentType::Other`].
    pub fn from_file_name(name: &str) -> Self {
        match name.rsplit_once('.') {
            Some((_, ext)) => ext.parse().unwrap_or(DocumentType::Other),
            None => DocumentType::Other,
        }
    }
}

impl FromStr for DocumentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => DocumentType::Pdf,
            "png" => DocumentType::Png,
            "jpg" | "jpeg" => DocumentType::Jpg,
            "tif" | "tiff" => DocumentType::Tiff,
            "docx" => DocumentType::Docx,
            "pptx" => DocumentType::Pptx,
            "html" | "htm" => DocumentType::Html,
            "txt" => DocumentType::Txt,
            "other" => DocumentType::Other,
            other => anyhow::bail!("unknown document type: {}", other),
        })
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document's position in the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    New,
    Parsed,
    Classified,
    ClassificationError,
    Extracted,
    Chunked,
}

impl LifecycleStatus {
    pub const ALL: [LifecycleStatus; 6] = [
        LifecycleStatus::New,
        LifecycleStatus::Parsed,
        LifecycleStatus::Classified,
        LifecycleStatus::ClassificationError,
        LifecycleStatus::Extracted,
        LifecycleStatus::Chunked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::New => "new",
            LifecycleStatus::Parsed => "parsed",
            LifecycleStatus::Classified => "classified",
            LifecycleStatus::ClassificationError => "classification_error",
            LifecycleStatus::Extracted => "extracted",
            LifecycleStatus::Chunked => "chunked",
        }
    }
}

impl FromStr for LifecycleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| anyhow::anyhow!("unknown lifecycle status: {}", s))
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested document as recorded by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub file_name: String,
    /// URI into blob storage.
    pub file_path: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    pub document_type: DocumentType,
    pub status: LifecycleStatus,
    /// Raw text produced by the parse stage.
    #[serde(default)]
    pub content_text: Option<String>,
}

/// The latest classification of a document.
///
/// `raw_label` is stored exactly as the classifier wrote it (a plain string
/// or a JSON label list); see [`crate::label`] for normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub document_id: String,
    pub raw_label: String,
    /// Unix timestamp (seconds).
    pub classified_at: i64,
}

impl Classification {
    /// The single display label for this classification.
    pub fn label(&self) -> String {
        crate::label::normalize_class_label(&self.raw_label)
    }
}

/// A structured attribute extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedAttribute {
    pub document_id: String,
    pub name: String,
    pub value: Option<String>,
    /// `None` means the extractor did not score this attribute.
    pub confidence: Option<f64>,
    /// Unix timestamp (seconds).
    pub extracted_at: i64,
}

impl ExtractedAttribute {
    /// True when the attribute is unscored or scored strictly below `threshold`.
    pub fn needs_review(&self, threshold: f64) -> bool {
        match self.confidence {
            Some(c) => c < threshold,
            None => true,
        }
    }
}

/// A slice of a document's text used as retrieval context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    /// Zero-based position within the document.
    pub chunk_index: i64,
    pub text: String,
    pub size: i64,
}

/// A row of the "recent documents" listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub file_name: String,
    pub file_path: String,
    pub document_class: String,
    pub status: LifecycleStatus,
    pub document_type: DocumentType,
    pub classified_at: i64,
}

/// Everything the console shows for a single document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentDetail {
    pub document: Document,
    pub document_class: Option<String>,
    pub classified_at: Option<i64>,
    pub attributes: Vec<ExtractedAttribute>,
    pub chunks: Vec<Chunk>,
}

/// Document totals, broken down by lifecycle status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentCounts {
    pub total: i64,
    pub by_status: BTreeMap<LifecycleStatus, i64>,
}

impl DocumentCounts {
    pub fn count(&self, status: LifecycleStatus) -> i64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkCounts {
    pub total_chunks: i64,
    pub chunked_documents: i64,
}

/// Number of documents carrying one normalized class label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassCount {
    pub label: String,
    pub count: i64,
}

/// Point-in-time aggregate of pipeline counters.
///
/// Each group is `None` when its backing query failed, so an unavailable
/// count is never confused with a successfully-read zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatusSnapshot {
    pub documents: Option<DocumentCounts>,
    pub extracted_documents: Option<i64>,
    pub chunks: Option<ChunkCounts>,
    /// Unix timestamp (seconds) at which the counts were read.
    pub taken_at: i64,
}

impl PipelineStatusSnapshot {
    pub fn empty(taken_at: i64) -> Self {
        Self {
            documents: None,
            extracted_documents: None,
            chunks: None,
            taken_at,
        }
    }

    /// All sub-queries succeeded.
    pub fn is_complete(&self) -> bool {
        self.documents.is_some() && self.extracted_documents.is_some() && self.chunks.is_some()
    }

    /// No sub-query succeeded; callers render "no data".
    pub fn is_empty(&self) -> bool {
        self.documents.is_none() && self.extracted_documents.is_none() && self.chunks.is_none()
    }

    /// Classified / errored / pending split of the document total.
    ///
    /// Only meaningful on a snapshot whose document counts were read.
    pub fn outcome_split(&self) -> Option<OutcomeSplit> {
        let docs = self.documents.as_ref()?;
        let succeeded = docs.total
            - docs.count(LifecycleStatus::New)
            - docs.count(LifecycleStatus::Parsed)
            - docs.count(LifecycleStatus::ClassificationError);
        let errored = docs.count(LifecycleStatus::ClassificationError);
        Some(OutcomeSplit {
            succeeded,
            errored,
            pending: (docs.total - succeeded - errored).max(0),
        })
    }
}

/// Success / error / pending breakdown derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutcomeSplit {
    pub succeeded: i64,
    pub errored: i64,
    pub pending: i64,
}
