//! Pipeline control relay.
//!
//! Invokes the external stage procedures one at a time and reports their
//! summary strings. A full run goes parse → classify → extract → chunk and
//! stops at the first failing stage. Earlier stages are not rolled back;
//! the procedures are expected to be idempotent so a rerun is safe.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::error::{ConsoleError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Classify,
    Extract,
    Chunk,
}

impl Stage {
    /// Execution order of a full run.
    pub const ORDER: [Stage; 4] = [Stage::Parse, Stage::Classify, Stage::Extract, Stage::Chunk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Classify => "classify",
            Stage::Extract => "extract",
            Stage::Chunk => "chunk",
        }
    }

    /// Name of the stored procedure behind the stage.
    pub fn procedure(&self) -> &'static str {
        match self {
            Stage::Parse => "parse_new_documents",
            Stage::Classify => "classify_parsed_documents",
            Stage::Extract => "extract_attributes_for_classified_documents",
            Stage::Chunk => "chunk_classified_documents",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parse" => Ok(Stage::Parse),
            "classify" => Ok(Stage::Classify),
            "extract" => Ok(Stage::Extract),
            "chunk" => Ok(Stage::Chunk),
            other => anyhow::bail!(
                "unknown stage '{}', expected one of: parse, classify, extract, chunk",
                other
            ),
        }
    }
}

/// Executes one stage procedure and returns its summary string.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(&self, stage: Stage) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
#[error("stage {stage} failed: {source:#}")]
pub struct RelayError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl ConsoleError for RelayError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded { message: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

/// Per-stage results of a full run, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullRun {
    pub reports: Vec<StageReport>,
}

impl FullRun {
    pub fn failed_stage(&self) -> Option<Stage> {
        self.reports
            .iter()
            .find(|r| matches!(r.outcome, StageOutcome::Failed { .. }))
            .map(|r| r.stage)
    }

    pub fn succeeded(&self) -> bool {
        self.failed_stage().is_none() && self.reports.len() == Stage::ORDER.len()
    }
}

pub struct PipelineRelay {
    runner: Arc<dyn StageRunner>,
}

impl PipelineRelay {
    pub fn new(runner: Arc<dyn StageRunner>) -> Self {
        Self { runner }
    }

    pub async fn run_stage(&self, stage: Stage) -> Result<String, RelayError> {
        tracing::info!(%stage, procedure = stage.procedure(), "running pipeline stage");
        match self.runner.run(stage).await {
            Ok(message) => {
                tracing::info!(%stage, %message, "pipeline stage finished");
                Ok(message)
            }
            Err(source) => {
                tracing::warn!(%stage, error = %source, "pipeline stage failed");
                Err(RelayError { stage, source })
            }
        }
    }

    /// Run every stage in order, stopping after the first failure.
    pub async fn run_full(&self) -> FullRun {
        let mut reports = Vec::with_capacity(Stage::ORDER.len());
        for stage in Stage::ORDER {
            match self.run_stage(stage).await {
                Ok(message) => reports.push(StageReport {
                    stage,
                    outcome: StageOutcome::Succeeded { message },
                }),
                Err(err) => {
                    reports.push(StageReport {
                        stage,
                        outcome: StageOutcome::Failed {
                            error: format!("{:#}", err.source),
                        },
                    });
                    break;
                }
            }
        }
        FullRun { reports }
    }
}
