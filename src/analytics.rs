//! Analytics reads over the SQLite mirror.
//!
//! Backs `docdash analytics …`: classification timeline, document types,
//! most-extracted attributes, and the flattened document × attribute
//! summary. Date ranges are validated before any query runs.

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use docdash_core::error::{ConsoleError, ErrorKind};
use docdash_core::label::normalize_class_label;

pub const DEFAULT_TIMELINE_DAYS: i64 = 30;
pub const DEFAULT_ATTRIBUTE_LIMIT: usize = 20;
pub const DEFAULT_SUMMARY_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("start date {since} is after end date {until}")]
    InvalidRange { since: NaiveDate, until: NaiveDate },
    #[error("analytics query failed: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ConsoleError for AnalyticsError {
    fn kind(&self) -> ErrorKind {
        match self {
            AnalyticsError::InvalidRange { .. } => ErrorKind::Validation,
            AnalyticsError::Store(_) => ErrorKind::Transient,
        }
    }
}

impl From<sqlx::Error> for AnalyticsError {
    fn from(e: sqlx::Error) -> Self {
        AnalyticsError::Store(e.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub day: String,
    pub documents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub document_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeStat {
    pub attribute_name: String,
    pub extraction_count: i64,
    pub unique_documents: i64,
    pub avg_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub document_id: String,
    pub file_name: String,
    pub document_type: String,
    pub document_class: Option<String>,
    pub attribute_name: Option<String>,
    pub attribute_value: Option<String>,
    pub confidence: Option<f64>,
}

pub struct Analytics<'a> {
    pool: &'a SqlitePool,
}

fn day_start(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Inclusive `[since, until]` window ending today when not given.
pub fn resolve_range(
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate), AnalyticsError> {
    let until = until.unwrap_or_else(|| Utc::now().date_naive());
    let since = since.unwrap_or(until - Duration::days(DEFAULT_TIMELINE_DAYS));
    if since > until {
        return Err(AnalyticsError::InvalidRange { since, until });
    }
    Ok((since, until))
}

impl<'a> Analytics<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Documents classified per day, oldest first.
    pub async fn timeline(
        &self,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailyCount>, AnalyticsError> {
        if since > until {
            return Err(AnalyticsError::InvalidRange { since, until });
        }
        let rows = sqlx::query(
            r#"
            SELECT date(classified_at, 'unixepoch') AS day, COUNT(*) AS n
            FROM document_classifications
            WHERE classified_at >= ? AND classified_at < ?
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(day_start(since))
        .bind(day_start(until + Duration::days(1)))
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| DailyCount {
                day: r.get("day"),
                documents: r.get("n"),
            })
            .collect())
    }

    pub async fn type_breakdown(&self) -> Result<Vec<TypeCount>, AnalyticsError> {
        let rows = sqlx::query(
            "SELECT document_type, COUNT(*) AS n FROM documents GROUP BY document_type ORDER BY n DESC, document_type",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| TypeCount {
                document_type: r.get("document_type"),
                count: r.get("n"),
            })
            .collect())
    }

    /// Most frequently extracted attribute names.
    pub async fn attribute_stats(
        &self,
        limit: usize,
    ) -> Result<Vec<AttributeStat>, AnalyticsError> {
        let rows = sqlx::query(
            r#"
            SELECT attribute_name,
                   COUNT(*) AS extraction_count,
                   COUNT(DISTINCT document_id) AS unique_documents,
                   AVG(confidence_score) AS avg_confidence
            FROM document_extractions
            GROUP BY attribute_name
            ORDER BY extraction_count DESC, attribute_name
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| AttributeStat {
                attribute_name: r.get("attribute_name"),
                extraction_count: r.get("extraction_count"),
                unique_documents: r.get("unique_documents"),
                avg_confidence: r.get("avg_confidence"),
            })
            .collect())
    }

    /// One row per document × attribute; documents without attributes
    /// appear once with empty attribute columns.
    pub async fn processing_summary(
        &self,
        limit: usize,
    ) -> Result<Vec<SummaryRow>, AnalyticsError> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.file_name, d.document_type, c.document_class,
                   e.attribute_name, e.attribute_value, e.confidence_score
            FROM documents d
            LEFT JOIN document_classifications c ON c.document_id = d.id
            LEFT JOIN document_extractions e ON e.document_id = d.id
            ORDER BY d.id, e.attribute_name
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| {
                let raw: Option<String> = r.get("document_class");
                SummaryRow {
                    document_id: r.get("id"),
                    file_name: r.get("file_name"),
                    document_type: r.get("document_type"),
                    document_class: raw.map(|c| normalize_class_label(&c)),
                    attribute_name: r.get("attribute_name"),
                    attribute_value: r.get("attribute_value"),
                    confidence: r.get("confidence_score"),
                }
            })
            .collect())
    }
}

// ============ CLI output ============

pub async fn run_timeline(
    analytics: &Analytics<'_>,
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
) -> Result<()> {
    let (since, until) = resolve_range(since, until)?;
    let days = analytics.timeline(since, until).await?;

    println!("Documents classified, {} to {}", since, until);
    if days.is_empty() {
        println!("  (no classifications in range)");
        return Ok(());
    }
    for d in &days {
        println!("  {}  {:>6}", d.day, d.documents);
    }
    Ok(())
}

pub async fn run_types(analytics: &Analytics<'_>) -> Result<()> {
    let types = analytics.type_breakdown().await?;
    println!("  {:<10} {:>8}", "TYPE", "DOCS");
    for t in &types {
        println!("  {:<10} {:>8}", t.document_type, t.count);
    }
    Ok(())
}

pub async fn run_attributes(analytics: &Analytics<'_>, limit: usize) -> Result<()> {
    let stats = analytics.attribute_stats(limit).await?;
    println!(
        "  {:<32} {:>8} {:>8} {:>8}",
        "ATTRIBUTE", "COUNT", "DOCS", "AVG CONF"
    );
    println!("  {}", "-".repeat(60));
    for s in &stats {
        let avg = s
            .avg_confidence
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<32} {:>8} {:>8} {:>8}",
            s.attribute_name, s.extraction_count, s.unique_documents, avg
        );
    }
    Ok(())
}

pub async fn run_summary(analytics: &Analytics<'_>, limit: usize, json: bool) -> Result<()> {
    let rows = analytics.processing_summary(limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for r in &rows {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            r.document_id,
            r.file_name,
            r.document_class.as_deref().unwrap_or("-"),
            r.attribute_name.as_deref().unwrap_or("-"),
            r.attribute_value.as_deref().unwrap_or("-"),
            r.confidence
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}
