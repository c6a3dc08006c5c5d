use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use studymate_core::SessionController;
use tempfile::NamedTempFile;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    spool_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self {
            controller,
            spool_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub cors_origins: Vec<HeaderValue>,
    pub max_upload_bytes: usize,
    /// Directory for uploads while they are ingested; the system temp
    /// directory when unset.
    pub spool_dir: Option<PathBuf>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            cors_origins: vec![
                HeaderValue::from_static("http://localhost:8080"),
                HeaderValue::from_static("http://127.0.0.1:8080"),
            ],
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            spool_dir: None,
        }
    }
}

pub fn create_app(mut state: AppState, settings: &ApiSettings) -> Router {
    state.spool_dir = settings.spool_dir.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(settings.cors_origins.clone()))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    Router::new()
        .route("/upload-pdf", post(upload_pdf))
        .route("/chat", post(chat))
        .route("/reset-conversation", post(reset_conversation))
        .route("/status", get(status))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Accepted for client compatibility; server-side memory is authoritative.
    #[serde(default)]
    pub chat_history: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub initialized: bool,
    pub has_database: bool,
    pub has_qa_chain: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Multipart(MultipartError),
    Json(JsonRejection),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Multipart(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::Json(rejection) => (rejection.status(), rejection.body_text()),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

fn is_pdf_name(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
}

async fn spool_upload(bytes: Bytes, dir: Option<PathBuf>) -> std::io::Result<NamedTempFile> {
    tokio::task::spawn_blocking(move || {
        let mut builder = tempfile::Builder::new();
        builder.prefix("studymate-").suffix(".pdf");
        let mut file = match &dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(std::io::Error::other)?
}

async fn upload_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(ApiError::Multipart)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string).unwrap_or_default();
        if !is_pdf_name(&filename) {
            return Err(ApiError::BadRequest(
                "Only PDF files are allowed".to_string(),
            ));
        }

        let bytes = field.bytes().await.map_err(ApiError::Multipart)?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    let spooled = spool_upload(bytes, state.spool_dir.clone())
        .await
        .map_err(|error| ApiError::Internal(format!("Error processing PDF: {error}")))?;
    let result = state.controller.try_ingest_path(spooled.path()).await;
    if let Err(error) = spooled.close() {
        warn!(%error, "failed to remove spooled upload");
    }

    match result {
        Ok(summary) => {
            info!(
                filename = %filename,
                session_id = %summary.session_id,
                chunks = summary.chunk_count,
                "pdf uploaded"
            );
            Ok(Json(UploadResponse {
                message: format!("PDF '{filename}' processed successfully"),
                filename,
            }))
        }
        Err(error) => {
            error!(filename = %filename, %error, "pdf upload failed");
            Err(ApiError::Internal(format!("Error processing PDF: {error}")))
        }
    }
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(ApiError::Json)?;
    if let Some(history) = &request.chat_history {
        debug!(turns = history.len(), "ignoring client supplied chat history");
    }

    let response = state.controller.answer(&request.message).await;
    Ok(Json(ChatResponse {
        response,
        sources: Vec::new(),
    }))
}

async fn reset_conversation(State(state): State<AppState>) -> Json<MessageResponse> {
    state.controller.reset().await;
    Json(MessageResponse {
        message: "Conversation reset successfully".to_string(),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.controller.status().await;
    Json(StatusResponse {
        initialized: status.initialized,
        has_database: status.has_index,
        has_qa_chain: status.has_pipeline,
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "StudyMate API is running",
    })
}
