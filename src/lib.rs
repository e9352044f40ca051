//! # docdash
//!
//! Operator console for a document-processing pipeline: documents are
//! parsed, classified, have attributes extracted, and are chunked by
//! external stage procedures; docdash reads the resulting Document Store,
//! lets a reviewer correct low-confidence extractions, answers questions
//! over the chunks, and triggers the stages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────┐   ┌──────────────┐
//! │ CLI / HTTP   │──▶│ Console                   │──▶│ SQLite mirror│
//! │ (docdash)    │   │ status·review·answer·relay│   │ FTS5 chunks  │
//! └──────────────┘   └────────────┬─────────────┘   └──────────────┘
//!                                 │
//!                 ┌───────────────┼────────────────┐
//!                 ▼               ▼                ▼
//!           search service   completion API   stage procedures
//! ```
//!
//! The engines and their traits live in `docdash-core`; this crate wires
//! them to SQLite, HTTP backends, shell commands, the CLI, and the API.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | `DocumentStore` + `SearchService` over SQLite |
//! | [`import`] | Load a JSON export into the mirror |
//! | [`search_client`] | Remote search service client |
//! | [`completion`] | OpenAI-compatible completion client |
//! | [`procedures`] | Stage runners (HTTP, shell command) |
//! | [`console`] | Engine wiring shared by CLI and server |
//! | [`analytics`] | Timeline, type, attribute and summary reads |
//! | [`server`] | JSON HTTP API |

pub mod analytics;
pub mod ask;
pub mod completion;
pub mod config;
pub mod console;
pub mod db;
pub mod documents;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod pipeline_cmd;
pub mod procedures;
pub mod review_cmd;
pub mod search_client;
pub mod server;
pub mod sqlite_store;
pub mod status_cmd;
