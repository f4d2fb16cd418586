//! HTTP Server for the Tablesmith API.
//!
//! Every table operation is scoped to a session opened with
//! `POST /api/sessions`.
//!
//! # API Endpoints
//!
//! | Method | Path                                 | Description                    |
//! |--------|--------------------------------------|--------------------------------|
//! | GET    | `/health`                            | Health check                   |
//! | POST   | `/api/sessions`                      | Open a session                 |
//! | DELETE | `/api/sessions/{id}`                 | Close a session                |
//! | POST   | `/api/sessions/{id}/upload`          | Upload a CSV file (multipart)  |
//! | POST   | `/api/sessions/{id}/sample`          | Load the sample dataset        |
//! | GET    | `/api/sessions/{id}/table`           | Current table and form options |
//! | POST   | `/api/sessions/{id}/transform`       | Preview a pipeline run         |
//! | POST   | `/api/sessions/{id}/export/{format}` | Download csv / xlsx / json     |
//! | GET    | `/api/logs`                          | SSE stream for real-time logs  |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{delete, get, post},
    Router,
};
use chrono::Duration as IdleTimeout;
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_error, LOG_BROADCASTER};
use super::types::{error_response, SessionResponse, TableResponse, TransformResponse};
use crate::config::AppConfig;
use crate::error::{PipelineError, ServerError, ServerResult, SessionError};
use crate::export::ExportFormat;
use crate::parser::LoadOptions;
use crate::session::SessionStore;
use crate::transform::TransformRequest;

/// Shared state of all handlers.
pub struct AppState {
    pub store: SessionStore,
    pub config: AppConfig,
}

type SharedState = Arc<AppState>;

/// Build the application router.
pub fn router(config: AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let body_limit = DefaultBodyLimit::max(config.max_upload_bytes);
    let state = Arc::new(AppState {
        store: SessionStore::new()
            .with_export_basename(config.export_basename.clone())
            .with_idle_timeout(IdleTimeout::minutes(i64::from(config.session_idle_minutes))),
        config,
    });

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", delete(close_session))
        .route("/api/sessions/{id}/upload", post(upload_csv))
        .route("/api/sessions/{id}/sample", post(load_sample))
        .route("/api/sessions/{id}/table", get(current_table))
        .route("/api/sessions/{id}/transform", post(transform))
        .route("/api/sessions/{id}/export/{format}", post(export))
        .route("/api/logs", get(sse_logs))
        .layer(body_limit)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let app = router(config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Tablesmith server running on http://localhost:{}", port);
    println!("   POST /api/sessions                    - Open a session");
    println!("   POST /api/sessions/{{id}}/upload        - Upload CSV file");
    println!("   POST /api/sessions/{{id}}/transform     - Preview transformations");
    println!("   POST /api/sessions/{{id}}/export/{{fmt}}  - Download csv / xlsx / json");
    println!("   GET  /api/logs                        - SSE log stream");
    println!("   GET  /health                          - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// Error mapping
// =============================================================================

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Pipeline(PipelineError::Load(_))
            | ServerError::Pipeline(PipelineError::Transform(_))
            | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(PipelineError::Session(SessionError::NotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            ServerError::Pipeline(PipelineError::Session(SessionError::NoTable)) => {
                StatusCode::CONFLICT
            }
            ServerError::Pipeline(PipelineError::Export(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log_error(self.to_string());
        }
        (status, Json(error_response(&self.to_string()))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "tablesmith",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "sessions": "POST /api/sessions",
            "upload": "POST /api/sessions/{id}/upload",
            "transform": "POST /api/sessions/{id}/transform",
            "export": "POST /api/sessions/{id}/export/{format}",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn create_session(State(state): State<SharedState>) -> Json<SessionResponse> {
    let session_id = state.store.create().await;
    Json(SessionResponse { session_id })
}

async fn close_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<Value>> {
    state.store.remove(id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Upload CSV endpoint. Expects a `file` field and an optional one-character
/// `delimiter` field.
async fn upload_csv(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ServerResult<Json<TableResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut delimiter: Option<char> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                file_data = Some(bytes.to_vec());
            }
            "delimiter" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                delimiter = Some(parse_delimiter(&text)?);
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;
    let file_name = file_name.unwrap_or_else(|| "upload.csv".to_string());
    let options = LoadOptions::with_delimiter(delimiter);
    let preview_rows = state.config.preview_rows;

    let response = state
        .store
        .with_session(id, |session| {
            session
                .load_bytes(&file_name, &bytes, &options)
                .map(|loaded| TableResponse::new(loaded, preview_rows))
        })
        .await?
        .map_err(PipelineError::from)?;

    Ok(Json(response))
}

async fn load_sample(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<TableResponse>> {
    let preview_rows = state.config.preview_rows;
    let response = state
        .store
        .with_session(id, |session| {
            session
                .load_sample()
                .map(|loaded| TableResponse::new(loaded, preview_rows))
        })
        .await?
        .map_err(PipelineError::from)?;

    Ok(Json(response))
}

async fn current_table(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<TableResponse>> {
    let preview_rows = state.config.preview_rows;
    let response = state
        .store
        .with_session(id, |session| {
            session
                .loaded()
                .map(|loaded| TableResponse::new(loaded, preview_rows))
                .ok_or(SessionError::NoTable)
        })
        .await??;

    Ok(Json(response))
}

async fn transform(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransformRequest>,
) -> ServerResult<Json<TransformResponse>> {
    let preview_rows = state.config.preview_rows;
    let response = state
        .store
        .with_session(id, |session| {
            session
                .run(&request)
                .map(|run| TransformResponse::new(&run, preview_rows))
        })
        .await??;

    Ok(Json(response))
}

/// Run the pipeline and return the encoded table as an attachment.
async fn export(
    State(state): State<SharedState>,
    Path((id, format)): Path<(Uuid, String)>,
    Json(request): Json<TransformRequest>,
) -> ServerResult<Response> {
    let format: ExportFormat = format
        .parse()
        .map_err(|e: crate::error::ExportError| ServerError::BadRequest(e.to_string()))?;

    let payload = state
        .store
        .with_session(id, |session| session.export(&request, format))
        .await??;

    let disposition = format!("attachment; filename=\"{}\"", payload.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, payload.media_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        payload.bytes,
    )
        .into_response())
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip the missed entries
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn parse_delimiter(text: &str) -> ServerResult<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ServerError::BadRequest(format!(
            "Delimiter must be a single character, got '{}'",
            text
        ))),
    }
}
