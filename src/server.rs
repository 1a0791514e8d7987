//! HTTP control surface for the curator.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Current run status and log |
//! | `POST` | `/runs` | Trigger a pipeline run (202, or 409 if one is in flight) |
//! | `POST` | `/runs/cancel` | Request cancellation of the in-flight run |
//! | `POST` | `/query` | Similarity query against the published index |
//!
//! # Error Contract
//!
//! All error responses use one JSON shape:
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "index not ready; run the pipeline first" } }
//! ```
//!
//! Error codes: `bad_request` (400), `already_running` (409),
//! `not_ready` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser dashboards
//! can talk to a local instance directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::service::{Curator, QueryError, QueryHit, StartOutcome};

/// Starts the HTTP server over an already constructed [`Curator`].
///
/// Binds to the address in `[server].bind` and serves until the process is
/// terminated.
pub async fn run_server(curator: Curator, bind_addr: &str) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/runs", post(handle_start_run))
        .route("/runs/cancel", post(handle_cancel_run))
        .route("/query", post(handle_query))
        .layer(cors)
        .with_state(curator);

    info!("curator listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_status(State(curator): State<Curator>) -> Response {
    Json(curator.status()).into_response()
}

#[derive(Serialize)]
struct RunAccepted {
    started: bool,
}

async fn handle_start_run(State(curator): State<Curator>) -> Result<Response, AppError> {
    match curator.start_run() {
        StartOutcome::Started => {
            Ok((StatusCode::ACCEPTED, Json(RunAccepted { started: true })).into_response())
        }
        StartOutcome::AlreadyRunning => Err(AppError::new(
            StatusCode::CONFLICT,
            "already_running",
            "a pipeline run is already in flight",
        )),
    }
}

#[derive(Serialize)]
struct CancelAccepted {
    cancelling: bool,
}

async fn handle_cancel_run(State(curator): State<Curator>) -> Json<CancelAccepted> {
    curator.cancel_run();
    Json(CancelAccepted { cancelling: true })
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    3
}

#[derive(Serialize)]
struct QueryResponse {
    hits: Vec<QueryHit>,
}

async fn handle_query(
    State(curator): State<Curator>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.top_k == 0 {
        return Err(bad_request("top_k must be at least 1"));
    }

    match curator.query(&req.query, req.top_k).await {
        Ok(hits) => Ok(Json(QueryResponse { hits })),
        Err(QueryError::NotReady) => Err(AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "not_ready",
            "index not ready; run the pipeline first",
        )),
        Err(QueryError::Internal(message)) => Err(AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            message,
        )),
    }
}
