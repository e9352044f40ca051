//! JSON HTTP API over the [`Console`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Pipeline status snapshot (cached) |
//! | `POST` | `/status/refresh` | Drop the cache and recompute |
//! | `GET`  | `/classes` | Documents per class |
//! | `GET`  | `/documents/recent?limit=` | Recently classified documents |
//! | `GET`  | `/documents/{id}?chunks=` | Document detail |
//! | `GET`  | `/documents/{id}/review?threshold=&all=` | Review candidates |
//! | `POST` | `/documents/{id}/attributes/{name}/approve` | `{"value": ...}` |
//! | `POST` | `/documents/{id}/attributes/{name}/deny` | Clear and zero an attribute |
//! | `POST` | `/documents/{id}/review/approve-all` | `{"threshold": ...}` |
//! | `POST` | `/documents/{id}/review/deny-all` | `{"threshold": ...}` |
//! | `POST` | `/ask` | `{"question", "class"?, "limit"?}` |
//! | `POST` | `/pipeline/full` | Run every stage in order |
//! | `POST` | `/pipeline/{stage}` | Run one stage |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation", "message": "confidence threshold must be in [0, 1], got 1.5" } }
//! ```
//!
//! The status code follows the error kind: `validation` 400, `not_found`
//! 404, `transient` 503, `partial` 500. Partial errors also carry
//! `"applied"`, the number of rows written before the failure.
//!
//! The server keeps one status cache for all clients, so every caller
//! shares the same snapshot window.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use docdash_core::answer::Answer;
use docdash_core::error::{ConsoleError, ErrorKind};
use docdash_core::models::{ClassCount, DocumentDetail, DocumentSummary, PipelineStatusSnapshot};
use docdash_core::relay::{FullRun, Stage};
use docdash_core::review::{ReviewCandidate, ReviewError};
use docdash_core::status::{StatusCache, StatusRead};

use crate::config::Config;
use crate::console::{Console, DETAIL_CHUNK_PREVIEW};

const DEFAULT_RECENT_LIMIT: usize = 20;

#[derive(Clone)]
struct AppState {
    console: Arc<Console>,
    status_cache: Arc<Mutex<StatusCache>>,
}

/// Open the console from `config` and serve on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let console = Console::open(config).await?;
    let listener = TcpListener::bind(&config.server.bind).await?;
    println!("docdash API listening on http://{}", listener.local_addr()?);
    serve(Arc::new(console), listener).await
}

/// Serve an already-built console on an already-bound listener.
pub async fn serve(console: Arc<Console>, listener: TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(console)).await?;
    Ok(())
}

pub fn router(console: Arc<Console>) -> Router {
    let state = AppState {
        status_cache: Arc::new(Mutex::new(console.new_status_cache())),
        console,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/status/refresh", post(handle_status_refresh))
        .route("/classes", get(handle_classes))
        .route("/documents/recent", get(handle_recent))
        .route("/documents/{id}", get(handle_document))
        .route("/documents/{id}/review", get(handle_review_list))
        .route(
            "/documents/{id}/attributes/{name}/approve",
            post(handle_approve),
        )
        .route("/documents/{id}/attributes/{name}/deny", post(handle_deny))
        .route("/documents/{id}/review/approve-all", post(handle_approve_all))
        .route("/documents/{id}/review/deny-all", post(handle_deny_all))
        .route("/ask", post(handle_ask))
        .route("/pipeline/full", post(handle_pipeline_full))
        .route("/pipeline/{stage}", post(handle_pipeline_stage))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<u64>,
}

struct AppError {
    kind: ErrorKind,
    message: String,
    applied: Option<u64>,
}

impl AppError {
    fn from_console<E: ConsoleError + Display>(err: E) -> Self {
        AppError {
            kind: err.kind(),
            message: err.to_string(),
            applied: None,
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        AppError {
            kind: ErrorKind::Validation,
            message: message.into(),
            applied: None,
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        let applied = err.applied();
        AppError {
            applied,
            ..AppError::from_console(err)
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Partial => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.kind != ErrorKind::Validation {
            tracing::warn!(kind = self.kind.as_str(), error = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.kind.as_str(),
                message: self.message,
                applied: self.applied,
            },
        };
        (status_for(self.kind), Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Status ============

#[derive(Serialize)]
struct StatusResponse {
    snapshot: PipelineStatusSnapshot,
    cached: bool,
    complete: bool,
    errors: Vec<String>,
}

impl From<StatusRead> for StatusResponse {
    fn from(read: StatusRead) -> Self {
        Self {
            complete: read.is_complete(),
            errors: read.errors.iter().map(|e| e.to_string()).collect(),
            cached: read.cached,
            snapshot: read.snapshot,
        }
    }
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut cache = state.status_cache.lock().await;
    Json(state.console.snapshot(&mut cache).await.into())
}

async fn handle_status_refresh(State(state): State<AppState>) -> Json<StatusResponse> {
    let mut cache = state.status_cache.lock().await;
    Json(state.console.refresh(&mut cache).await.into())
}

#[derive(Serialize)]
struct ClassesResponse {
    classes: Vec<ClassCount>,
}

async fn handle_classes(State(state): State<AppState>) -> Result<Json<ClassesResponse>, AppError> {
    let mut cache = state.status_cache.lock().await;
    let classes = state
        .console
        .class_breakdown(&mut cache)
        .await
        .map_err(AppError::from_console)?;
    Ok(Json(ClassesResponse { classes }))
}

// ============ Documents ============

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct RecentResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_recent(
    State(state): State<AppState>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<RecentResponse>, AppError> {
    let Query(q) = query?;
    let limit = q.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    if limit == 0 {
        return Err(AppError::validation("limit must be at least 1"));
    }
    let documents = state
        .console
        .recent_documents(limit)
        .await
        .map_err(AppError::from_console)?;
    Ok(Json(RecentResponse { documents }))
}

#[derive(Deserialize)]
struct DetailQuery {
    chunks: Option<usize>,
}

async fn handle_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<DetailQuery>, QueryRejection>,
) -> Result<Json<DocumentDetail>, AppError> {
    let Query(q) = query?;
    let detail = state
        .console
        .document_detail(&id, Some(q.chunks.unwrap_or(DETAIL_CHUNK_PREVIEW)))
        .await
        .map_err(AppError::from_console)?;
    Ok(Json(detail))
}

// ============ Review ============

#[derive(Deserialize)]
struct ReviewQuery {
    threshold: Option<f64>,
    #[serde(default)]
    all: bool,
}

#[derive(Serialize)]
struct ReviewResponse {
    document_id: String,
    threshold: f64,
    attributes: Vec<ReviewCandidate>,
}

async fn handle_review_list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<ReviewQuery>, QueryRejection>,
) -> Result<Json<ReviewResponse>, AppError> {
    let Query(q) = query?;
    let threshold = q
        .threshold
        .unwrap_or(state.console.config().review.default_threshold);
    let review = state.console.review();
    let attributes = if q.all {
        review.list_attributes(&id, threshold).await?
    } else {
        review.list_review_candidates(&id, threshold).await?
    };
    Ok(Json(ReviewResponse {
        document_id: id,
        threshold,
        attributes,
    }))
}

#[derive(Deserialize)]
struct ApproveBody {
    value: String,
}

#[derive(Serialize)]
struct WriteResponse {
    updated: u64,
}

async fn handle_approve(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(body): Json<ApproveBody>,
) -> Result<Json<WriteResponse>, AppError> {
    state.console.review().approve(&id, &name, &body.value).await?;
    Ok(Json(WriteResponse { updated: 1 }))
}

async fn handle_deny(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<WriteResponse>, AppError> {
    state.console.review().deny(&id, &name).await?;
    Ok(Json(WriteResponse { updated: 1 }))
}

#[derive(Deserialize, Default)]
struct BulkBody {
    threshold: Option<f64>,
}

async fn handle_approve_all(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<BulkBody>>,
) -> Result<Json<WriteResponse>, AppError> {
    let threshold = bulk_threshold(&state, body);
    let updated = state.console.review().bulk_approve(&id, threshold).await?;
    Ok(Json(WriteResponse { updated }))
}

async fn handle_deny_all(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<BulkBody>>,
) -> Result<Json<WriteResponse>, AppError> {
    let threshold = bulk_threshold(&state, body);
    let updated = state.console.review().bulk_deny(&id, threshold).await?;
    Ok(Json(WriteResponse { updated }))
}

fn bulk_threshold(state: &AppState, body: Option<Json<BulkBody>>) -> f64 {
    body.and_then(|Json(b)| b.threshold)
        .unwrap_or(state.console.config().review.default_threshold)
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskBody {
    question: String,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(body): Json<AskBody>,
) -> Result<Json<Answer>, AppError> {
    let limit = body
        .limit
        .unwrap_or(state.console.config().answer.default_limit);
    let class = body
        .class
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"));
    let answer = state
        .console
        .answer(&body.question, class, limit)
        .await
        .map_err(AppError::from_console)?;
    Ok(Json(answer))
}

// ============ Pipeline ============

#[derive(Serialize)]
struct StageResponse {
    stage: Stage,
    message: String,
}

async fn handle_pipeline_stage(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> Result<Json<StageResponse>, AppError> {
    let stage: Stage = stage
        .parse()
        .map_err(|e: anyhow::Error| AppError::validation(e.to_string()))?;
    let message = state
        .console
        .relay()
        .run_stage(stage)
        .await
        .map_err(AppError::from_console)?;
    state.status_cache.lock().await.invalidate();
    Ok(Json(StageResponse { stage, message }))
}

/// A stopped run is still a 200: the per-stage reports say where it stopped.
async fn handle_pipeline_full(State(state): State<AppState>) -> Json<FullRun> {
    let run = state.console.relay().run_full().await;
    state.status_cache.lock().await.invalidate();
    Json(run)
}
