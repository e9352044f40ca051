//! Stage runners behind the pipeline control relay.
//!
//! | Runner | Invocation | Summary string |
//! |--------|------------|----------------|
//! | `disabled` | none, always fails | n/a |
//! | `http` | `POST {endpoint}/procedures/{procedure}` | `result` field of the JSON reply |
//! | `command` | `sh -c <pipeline.commands.<stage>>` | trimmed stdout; non-zero exit fails |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use docdash_core::relay::{Stage, StageRunner};

use crate::config::PipelineConfig;

pub struct DisabledRunner;

#[async_trait]
impl StageRunner for DisabledRunner {
    async fn run(&self, stage: Stage) -> Result<String> {
        bail!(
            "pipeline runner is disabled; cannot run {} (set [pipeline] runner in the config)",
            stage.procedure()
        )
    }
}

pub struct HttpStageRunner {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ProcedureResponse {
    result: serde_json::Value,
}

impl HttpStageRunner {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StageRunner for HttpStageRunner {
    async fn run(&self, stage: Stage) -> Result<String> {
        let url = format!("{}/procedures/{}", self.endpoint, stage.procedure());
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .with_context(|| format!("failed to call {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", stage.procedure(), status, text);
        }

        let parsed: ProcedureResponse = response
            .json()
            .await
            .with_context(|| format!("invalid response from {}", stage.procedure()))?;
        Ok(match parsed.result {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

pub struct CommandStageRunner {
    commands: BTreeMap<Stage, String>,
    timeout: Duration,
}

impl CommandStageRunner {
    pub fn new(commands: &BTreeMap<String, String>, timeout: Duration) -> Result<Self> {
        let commands = commands
            .iter()
            .map(|(name, cmd)| Ok((name.parse::<Stage>()?, cmd.clone())))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { commands, timeout })
    }
}

#[async_trait]
impl StageRunner for CommandStageRunner {
    async fn run(&self, stage: Stage) -> Result<String> {
        let command = self
            .commands
            .get(&stage)
            .ok_or_else(|| anyhow!("no command configured for stage '{}'", stage))?;

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| anyhow!("{} timed out after {:?}", stage.procedure(), self.timeout))?
        .with_context(|| format!("failed to spawn command for stage '{}'", stage))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                stage.procedure(),
                output.status,
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Build the configured stage runner.
pub fn create_runner(config: &PipelineConfig) -> Result<Arc<dyn StageRunner>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.runner.as_str() {
        "disabled" => Ok(Arc::new(DisabledRunner)),
        "http" => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow!("pipeline.endpoint required for http runner"))?;
            Ok(Arc::new(HttpStageRunner::new(endpoint, timeout)?))
        }
        "command" => Ok(Arc::new(CommandStageRunner::new(&config.commands, timeout)?)),
        other => bail!("Unknown pipeline runner: {}", other),
    }
}
