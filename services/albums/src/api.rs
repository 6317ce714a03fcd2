use crate::album_store::AlbumStore;
use crate::blob_store::BlobStore;
use crate::config::{ApiConfig, Config};
use crate::error::AlbumError;
use crate::lifecycle::{AlbumStatus, ExpiryPolicy};
use crate::model::{Album, NewAlbum, Photo};
use crate::read_service::{AlbumProjection, AlbumReadService, AlbumView};
use crate::repository::AlbumRepository;
use crate::upload::{FileFailure, StagedFile, UploadLimits, UploadPipeline};
use anyhow::{Context, Result};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeader;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repository: AlbumRepository,
    pub reader: AlbumReadService,
    pub uploads: UploadPipeline,
    pub field_name: String,
    pub max_batch_bytes: usize,
    pub staging_dir: Option<PathBuf>,
    pub public_base_url: Option<String>,
}

impl AppState {
    /// Wire the album services on top of the given backends
    pub fn new(store: Arc<dyn AlbumStore>, blobs: Arc<dyn BlobStore>, config: &Config) -> Self {
        let repository = AlbumRepository::new(store);
        let policy = ExpiryPolicy::new(config.albums.expiry_window_months);

        Self {
            reader: AlbumReadService::new(repository.clone(), policy),
            uploads: UploadPipeline::new(
                repository.clone(),
                blobs,
                UploadLimits::from(&config.uploads),
            ),
            repository,
            field_name: config.uploads.field_name.clone(),
            max_batch_bytes: config.uploads.max_batch_bytes,
            staging_dir: config.uploads.staging_dir.clone(),
            public_base_url: config.albums.public_base_url.clone(),
        }
    }

    fn share_url(&self, album_id: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/view/{}", base.trim_end_matches('/'), album_id))
    }
}

/// Album creation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlbumRequest {
    pub title: Option<String>,
    pub public_date: Option<String>,
}

/// Album as returned to its creator
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumResponse {
    pub id: String,
    pub doc_id: Uuid,
    pub title: String,
    pub public_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub photos: Vec<Photo>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub share_url: Option<String>,
}

impl AlbumResponse {
    fn new(album: Album, expires_at: DateTime<Utc>, share_url: Option<String>) -> Self {
        Self {
            id: album.id,
            doc_id: album.doc_id,
            title: album.title,
            public_date: album.public_date,
            created_at: album.created_at,
            updated_at: album.updated_at,
            photos: album.photos,
            is_active: album.is_active,
            expires_at,
            share_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateAlbumResponse {
    pub message: String,
    pub album: AlbumResponse,
}

#[derive(Debug, Serialize)]
pub struct ActiveAlbumResponse {
    pub album: AlbumProjection,
}

/// Body for albums that cannot be viewed right now
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatedAlbumResponse {
    pub message: String,
    pub status: AlbumStatus,
    pub public_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub success: usize,
    pub errors: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub photos: Vec<Photo>,
    pub summary: UploadSummary,
    pub failures: Vec<FileFailure>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl AlbumError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::AllUploadsFailed { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StoragePermission(_) => StatusCode::FORBIDDEN,
            Self::StorageTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Backend(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::NotFound(_) => "Album not found".to_string(),
            Self::AllUploadsFailed { .. } => "No valid image files were uploaded".to_string(),
            Self::StoragePermission(_) => "Photo storage refused the upload".to_string(),
            Self::StorageTimeout(_) => "Photo storage timed out, please try again".to_string(),
            Self::Backend(_) | Self::Internal(_) => {
                "Something went wrong on our side, please try again later".to_string()
            }
        }
    }
}

impl IntoResponse for AlbumError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = ?self, "Request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let body_limit = DefaultBodyLimit::max(state.max_batch_bytes);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/albums", post(create_album))
        .route("/albums/:id", get(get_album))
        .route("/albums/:id/upload", post(upload_photos).layer(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve locally stored photos under `prefix` with long-lived cache headers
pub fn serve_local_uploads(router: Router, prefix: &str, root: PathBuf) -> Router {
    let service = SetResponseHeader::overriding(
        ServeDir::new(root),
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    router.nest_service(prefix, service)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "album-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.repository.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Create a new album
#[instrument(skip(state, payload))]
async fn create_album(
    State(state): State<AppState>,
    payload: Result<Json<CreateAlbumRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateAlbumResponse>), AlbumError> {
    let Json(request) = payload.map_err(|e| AlbumError::validation(e.body_text()))?;
    let new_album = NewAlbum::parse(request.title.as_deref(), request.public_date.as_deref())?;

    let album = state.repository.create(new_album, Utc::now()).await?;
    let expires_at = state.reader.policy().expiry_date(album.public_date);
    let share_url = state.share_url(&album.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateAlbumResponse {
            message: "Album created".to_string(),
            album: AlbumResponse::new(album, expires_at, share_url),
        }),
    ))
}

/// View an album, gated by its public date and expiry window
#[instrument(skip(state))]
async fn get_album(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
) -> Result<Response, AlbumError> {
    let response = match state.reader.get_album(&album_id, Utc::now()).await? {
        AlbumView::Active(album) => {
            (StatusCode::OK, Json(ActiveAlbumResponse { album })).into_response()
        }
        AlbumView::NotPublic { public_date } => (
            StatusCode::FORBIDDEN,
            Json(GatedAlbumResponse {
                message: "This album is not public yet".to_string(),
                status: AlbumStatus::NotPublic,
                public_date,
                expired_at: None,
            }),
        )
            .into_response(),
        AlbumView::Expired {
            public_date,
            expired_at,
        } => (
            StatusCode::GONE,
            Json(GatedAlbumResponse {
                message: "This album has expired".to_string(),
                status: AlbumStatus::Expired,
                public_date,
                expired_at: Some(expired_at),
            }),
        )
            .into_response(),
    };

    Ok(response)
}

/// Upload a batch of photos into an album
#[instrument(skip(state, multipart))]
async fn upload_photos(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AlbumError> {
    let multipart = multipart.map_err(|e| AlbumError::validation(e.body_text()))?;

    // Unknown albums are refused before the body is staged
    state.repository.find_by_external_id(&album_id).await?;

    let files = stage_multipart(&state, multipart).await?;
    let outcome = state.uploads.upload_photos(&album_id, files).await?;

    Ok(Json(UploadResponse {
        message: format!("Uploaded {} photos", outcome.success_count),
        summary: UploadSummary {
            success: outcome.success_count,
            errors: outcome.error_count,
            total: outcome.total_count,
        },
        photos: outcome.photos,
        failures: outcome.failures,
    }))
}

/// Stream every file field of the request into its own staging file
async fn stage_multipart(state: &AppState, mut multipart: Multipart) -> Result<Vec<StagedFile>, AlbumError> {
    let limits = state.uploads.limits();
    // One byte past the cap is enough to tell the file is too large
    let write_cap = limits.max_file_size_bytes.saturating_add(1);
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(state.field_name.as_str()) {
            continue;
        }
        if files.len() >= limits.max_files_per_batch {
            return Err(AlbumError::validation(format!(
                "At most {} files can be uploaded at once",
                limits.max_files_per_batch
            )));
        }

        let mut staged = StagedFile::create(
            state.staging_dir.as_deref(),
            field.file_name().map(str::to_string),
            field.content_type().map(str::to_string),
            write_cap,
        )
        .context("Failed to create staging file")
        .map_err(AlbumError::Internal)?;

        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            staged
                .write_chunk(&chunk)
                .await
                .context("Failed to stage upload")
                .map_err(AlbumError::Internal)?;
        }

        files.push(staged);
    }

    Ok(files)
}

fn multipart_error(err: MultipartError) -> AlbumError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AlbumError::validation("Upload is larger than the allowed request size")
    } else {
        AlbumError::validation(format!("Malformed upload: {}", err.body_text()))
    }
}

/// Start the album API server and run until `shutdown` is cancelled
pub async fn start_api_server(router: Router, config: &ApiConfig, shutdown: CancellationToken) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting album API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("API server error")?;

    Ok(())
}
