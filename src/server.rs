//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check with table, match function, and model |
//! | `POST` | `/ingest/file` | Multipart upload (`file` field), ingested then removed |
//! | `POST` | `/chat` | Retrieval plus grounded answer with sources |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "validation error: k must be >= 1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_failure` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use ragline_core::PipelineError;

use crate::service::{ChatRequest, ChatResponse, IngestResponse, Service};
use crate::upload::{sanitize_filename, save_upload};

/// Build the router over a ready [`Service`].
pub fn router(service: Service) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let upload_limit = service.config().server.max_upload_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/ingest/file",
            post(handle_ingest_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(service)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(service: Service) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let app = router(service);

    println!("ragline server listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        if err.is_caller_error() {
            return bad_request(err.to_string());
        }
        match err {
            PipelineError::IngestionFailed { .. }
            | PipelineError::RetrievalFailed { .. }
            | PipelineError::SynthesisFailed(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "upstream_failure".to_string(),
                message: err.to_string(),
            },
            other => internal(other.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    table_name: String,
    match_function: String,
    model: String,
}

async fn handle_health(State(service): State<Service>) -> Json<HealthResponse> {
    let config = service.config();
    Json(HealthResponse {
        status: "ok".to_string(),
        table_name: config.store.table.clone(),
        match_function: config.store.match_function.clone(),
        model: config.openai.chat_model.clone(),
    })
}

// ============ POST /chat ============

async fn handle_chat(
    State(service): State<Service>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let response = service.chat(&req).await.map_err(|e| {
        error!(error = %e, "chat failed");
        AppError::from(e)
    })?;
    Ok(Json(response))
}

// ============ POST /ingest/file ============

#[derive(Debug, Deserialize)]
struct IngestParams {
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    #[serde(default)]
    keep_file: bool,
}

async fn handle_ingest_file(
    State(service): State<Service>,
    Query(params): Query<IngestParams>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    service
        .ingestion_config(params.chunk_size, params.chunk_overlap)
        .validate()?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let raw_name = field.file_name().unwrap_or_default().to_string();
        let filename = sanitize_filename(&raw_name)
            .ok_or_else(|| bad_request(format!("invalid upload filename: '{raw_name}'")))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Failed to read upload: {e}")))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing 'file' field"))?;

    let tmp_dir = &service.config().server.tmp_dir;
    let saved = save_upload(tmp_dir, &filename, &bytes)
        .await
        .map_err(|e| internal(format!("{e:#}")))?;

    let result = service
        .ingest(saved.path(), params.chunk_size, params.chunk_overlap)
        .await;

    if params.keep_file {
        let kept = saved.keep();
        info!(path = %kept.display(), "kept uploaded file");
    } else {
        saved.remove().await;
    }

    let response = result.map_err(|e| {
        error!(file = %filename, error = %e, "ingest failed");
        AppError::from(e)
    })?;
    info!(file = %filename, chunks = response.chunks_added, "ingested upload");
    Ok(Json(response))
}
