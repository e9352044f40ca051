//! # docdash core
//!
//! Runtime-agnostic logic for the document pipeline console: the data
//! model, the storage / search / completion / stage-runner abstractions,
//! and the four engines that sit on top of them.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! backends (SQLite mirror, HTTP search and completion clients, stage
//! runners) live in the `docdash` application crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`status`] | Cached pipeline status snapshot and class breakdown |
//! | [`review`] | Confidence-gated review of extracted attributes |
//! | [`answer`] | Retrieve-then-generate question answering |
//! | [`relay`] | Pass-through to the external pipeline stages |
//! | [`session`] | Per-reviewer session context |

pub mod answer;
pub mod chat;
pub mod completion;
pub mod error;
pub mod label;
pub mod models;
pub mod relay;
pub mod review;
pub mod search;
pub mod session;
pub mod status;
pub mod store;
