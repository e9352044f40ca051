//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] parses the file and rejects values the engines
//! would refuse later anyway (thresholds outside `[0, 1]`, limits outside
//! `1..=20`, a provider without the endpoint it needs).
//!
//! ```toml
//! [db]
//! path = "./data/docdash.sqlite"
//!
//! [search]
//! provider = "http"
//! endpoint = "http://search.internal:8080"
//! service = "document_search_service"
//!
//! [completion]
//! provider = "openai"
//! model = "mixtral-8x7b"
//! endpoint = "http://llm.internal:8000/v1"
//!
//! [pipeline]
//! runner = "command"
//!
//! [pipeline.commands]
//! parse = "./bin/parse_new_documents"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use docdash_core::answer::{DEFAULT_MAX_CONTEXT_CHARS, DEFAULT_RESULT_LIMIT, MAX_RESULT_LIMIT};
use docdash_core::chat::DEFAULT_CHAT_MEMORY;
use docdash_core::relay::Stage;
use docdash_core::review::DEFAULT_REVIEW_THRESHOLD;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatusConfig {
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_secs: u64,
    #[serde(default = "default_classes_ttl")]
    pub classes_ttl_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: default_snapshot_ttl(),
            classes_ttl_secs: default_classes_ttl(),
        }
    }
}

fn default_snapshot_ttl() -> u64 {
    30
}
fn default_classes_ttl() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReviewConfig {
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_REVIEW_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_result_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_chat_memory")]
    pub chat_memory: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            default_limit: default_result_limit(),
            max_context_chars: default_max_context_chars(),
            chat_memory: default_chat_memory(),
        }
    }
}

fn default_result_limit() -> usize {
    DEFAULT_RESULT_LIMIT
}
fn default_max_context_chars() -> usize {
    DEFAULT_MAX_CONTEXT_CHARS
}
fn default_chat_memory() -> usize {
    DEFAULT_CHAT_MEMORY
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// `local` (FTS5 over the SQLite mirror) or `http`.
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_search_service")]
    pub service: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            endpoint: None,
            service: default_search_service(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_provider() -> String {
    "local".to_string()
}
fn default_search_service() -> String {
    "document_search_service".to_string()
}
fn default_search_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// `disabled` or `openai` (any OpenAI-compatible chat completions API).
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the bearer token. Unset means no auth header.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_completion_model(),
            endpoint: default_completion_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_completion_provider() -> String {
    "disabled".to_string()
}
fn default_completion_model() -> String {
    "mixtral-8x7b".to_string()
}
fn default_completion_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_completion_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// `disabled`, `http`, or `command`.
    #[serde(default = "default_runner")]
    pub runner: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_pipeline_timeout")]
    pub timeout_secs: u64,
    /// Shell command per stage name, for the `command` runner.
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            runner: default_runner(),
            endpoint: None,
            timeout_secs: default_pipeline_timeout(),
            commands: BTreeMap::new(),
        }
    }
}

fn default_runner() -> String {
    "disabled".to_string()
}
fn default_pipeline_timeout() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !(0.0..=1.0).contains(&config.review.default_threshold) {
        bail!("review.default_threshold must be in [0.0, 1.0]");
    }

    if !(1..=MAX_RESULT_LIMIT).contains(&config.answer.default_limit) {
        bail!("answer.default_limit must be between 1 and {}", MAX_RESULT_LIMIT);
    }
    if config.answer.max_context_chars == 0 {
        bail!("answer.max_context_chars must be > 0");
    }
    if config.answer.chat_memory == 0 {
        bail!("answer.chat_memory must be > 0");
    }

    match config.search.provider.as_str() {
        "local" => {}
        "http" => {
            if config.search.endpoint.is_none() {
                bail!("search.endpoint must be specified when provider is 'http'");
            }
        }
        other => bail!(
            "Unknown search provider: '{}'. Must be local or http.",
            other
        ),
    }

    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.completion.timeout_secs == 0 {
        bail!("completion.timeout_secs must be > 0");
    }

    match config.pipeline.runner.as_str() {
        "disabled" => {}
        "http" => {
            if config.pipeline.endpoint.is_none() {
                bail!("pipeline.endpoint must be specified when runner is 'http'");
            }
        }
        "command" => {
            for name in config.pipeline.commands.keys() {
                name.parse::<Stage>()
                    .with_context(|| format!("invalid key in [pipeline.commands]: '{}'", name))?;
            }
        }
        other => bail!(
            "Unknown pipeline runner: '{}'. Must be disabled, http, or command.",
            other
        ),
    }

    Ok(())
}
