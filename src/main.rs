//! # docdash CLI
//!
//! ```bash
//! docdash --config ./config/docdash.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docdash init` | Create the SQLite mirror and run schema migrations |
//! | `docdash import <file>` | Load a JSON export into the mirror |
//! | `docdash status` | Pipeline counts per stage |
//! | `docdash classes` | Documents per class |
//! | `docdash documents recent\|show` | Browse classified documents |
//! | `docdash review …` | List, approve and deny extracted attributes |
//! | `docdash ask "<question>"` | One-shot question over the chunks |
//! | `docdash chat` | Interactive question loop |
//! | `docdash pipeline run <stage>\|full` | Trigger stage procedures |
//! | `docdash analytics …` | Timeline, types, attributes, summary |
//! | `docdash serve` | Start the HTTP API |

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docdash::console::{Console, DETAIL_CHUNK_PREVIEW};
use docdash::{
    analytics, ask, config, documents, import, logging, migrate, pipeline_cmd, review_cmd, server,
    status_cmd,
};
use docdash_core::relay::Stage;

/// docdash: operator console for a document-processing pipeline.
///
/// All commands accept `--config` pointing to a TOML configuration file.
/// See `config/docdash.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docdash", version, about = "Operator console for a document-processing pipeline")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docdash.toml")]
    config: PathBuf,

    /// Debug-level logs on stderr (`RUST_LOG` still wins).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite mirror and its tables. Idempotent.
    Init,

    /// Load a JSON export `{documents, classifications, extractions, chunks}`.
    Import {
        /// Path to the export file.
        file: PathBuf,
    },

    /// Show pipeline counts per stage.
    Status {
        /// Ignore the cached snapshot.
        #[arg(long)]
        refresh: bool,
    },

    /// Documents per class, failed classifications excluded.
    Classes,

    /// Browse classified documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Review extracted attributes.
    Review {
        #[command(subcommand)]
        action: ReviewAction,
    },

    /// Ask one question over the document chunks.
    Ask {
        question: String,
        /// Restrict retrieval to one class (`All` for none).
        #[arg(long)]
        class: Option<String>,
        /// Chunks to retrieve (1–20).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Interactive question loop on stdin.
    Chat {
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Trigger pipeline stage procedures.
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },

    /// Processing analytics over the mirror.
    Analytics {
        #[command(subcommand)]
        action: AnalyticsAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum DocumentsAction {
    /// Most recently classified documents.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// One document with its attributes and chunks.
    Show {
        id: String,
        /// Chunks to print (default 3).
        #[arg(long)]
        chunks: Option<usize>,
        /// Print every chunk.
        #[arg(long, conflicts_with = "chunks")]
        all_chunks: bool,
    },
}

#[derive(Subcommand)]
enum ReviewAction {
    /// Attributes below the threshold (or unscored), by attribute name.
    List {
        document_id: String,
        #[arg(long)]
        threshold: Option<f64>,
        /// Show every attribute, not only candidates.
        #[arg(long)]
        all: bool,
    },
    /// Set an attribute's value and mark it fully confident.
    Approve {
        document_id: String,
        attribute: String,
        value: String,
    },
    /// Clear an attribute's value and zero its confidence.
    Deny {
        document_id: String,
        attribute: String,
    },
    /// Approve every scored attribute below the threshold as-is.
    ApproveAll {
        document_id: String,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Deny every scored attribute below the threshold.
    DenyAll {
        document_id: String,
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[derive(Subcommand)]
enum PipelineAction {
    /// Run one stage: parse, classify, extract or chunk.
    Run { stage: Stage },
    /// Run all stages in order, stopping at the first failure.
    Full {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AnalyticsAction {
    /// Documents classified per day (default: last 30 days).
    Timeline {
        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<NaiveDate>,
        /// End date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Documents per detected type.
    Types,
    /// Most frequently extracted attributes.
    Attributes {
        #[arg(long, default_value_t = analytics::DEFAULT_ATTRIBUTE_LIMIT)]
        limit: usize,
    },
    /// Flattened document × attribute rows.
    Summary {
        #[arg(long, default_value_t = analytics::DEFAULT_SUMMARY_LIMIT)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match &cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            return Ok(());
        }
        Commands::Import { file } => {
            return import::run_import(&cfg, file).await;
        }
        Commands::Serve => {
            return server::run_server(&cfg).await;
        }
        _ => {}
    }

    let console = Console::open(&cfg).await?;
    let default_threshold = cfg.review.default_threshold;

    match cli.command {
        Commands::Status { refresh } => status_cmd::run_status(&console, refresh).await?,
        Commands::Classes => status_cmd::run_classes(&console).await?,
        Commands::Documents { action } => match action {
            DocumentsAction::Recent { limit } => documents::run_recent(&console, limit).await?,
            DocumentsAction::Show {
                id,
                chunks,
                all_chunks,
            } => {
                let chunks = if all_chunks {
                    None
                } else {
                    Some(chunks.unwrap_or(DETAIL_CHUNK_PREVIEW))
                };
                documents::run_show(&console, &id, chunks).await?
            }
        },
        Commands::Review { action } => match action {
            ReviewAction::List {
                document_id,
                threshold,
                all,
            } => {
                review_cmd::run_list(
                    &console,
                    &document_id,
                    threshold.unwrap_or(default_threshold),
                    all,
                )
                .await?
            }
            ReviewAction::Approve {
                document_id,
                attribute,
                value,
            } => review_cmd::run_approve(&console, &document_id, &attribute, &value).await?,
            ReviewAction::Deny {
                document_id,
                attribute,
            } => review_cmd::run_deny(&console, &document_id, &attribute).await?,
            ReviewAction::ApproveAll {
                document_id,
                threshold,
            } => {
                review_cmd::run_bulk(
                    &console,
                    &document_id,
                    threshold.unwrap_or(default_threshold),
                    true,
                )
                .await?
            }
            ReviewAction::DenyAll {
                document_id,
                threshold,
            } => {
                review_cmd::run_bulk(
                    &console,
                    &document_id,
                    threshold.unwrap_or(default_threshold),
                    false,
                )
                .await?
            }
        },
        Commands::Ask {
            question,
            class,
            limit,
        } => ask::run_ask(&console, &question, class.as_deref(), limit).await?,
        Commands::Chat { class, limit } => {
            ask::run_chat(&console, class.as_deref(), limit).await?
        }
        Commands::Pipeline { action } => match action {
            PipelineAction::Run { stage } => pipeline_cmd::run_stage(&console, stage).await?,
            PipelineAction::Full { json } => pipeline_cmd::run_full(&console, json).await?,
        },
        Commands::Analytics { action } => {
            let analytics = console.analytics();
            match action {
                AnalyticsAction::Timeline { since, until } => {
                    analytics::run_timeline(&analytics, since, until).await?
                }
                AnalyticsAction::Types => analytics::run_types(&analytics).await?,
                AnalyticsAction::Attributes { limit } => {
                    analytics::run_attributes(&analytics, limit).await?
                }
                AnalyticsAction::Summary { limit, json } => {
                    analytics::run_summary(&analytics, limit, json).await?
                }
            }
        }
        Commands::Init | Commands::Import { .. } | Commands::Serve => {}
    }

    Ok(())
}
