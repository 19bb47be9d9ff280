//! HTTP request handlers for health checks and the admin API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check endpoint
//! - `GET /api/admin/image-cache/stats` - Derivative cache statistics
//! - `DELETE /api/admin/image-cache` - Delete every cached derivative
//! - `POST /api/admin/upload` - Upload one image (field `image`)
//! - `POST /api/admin/upload-multiple` - Upload several images (field `images`)
//!
//! Image serving under `/uploads` lives in [`super::middleware`].

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::derivative::{CacheStats, DerivativeService};
use crate::error::{StoreError, UploadError};
use crate::upload::{save_upload, spawn_optimize, StoredUpload, UploadPolicy};

/// Default `Cache-Control` max-age for images (one year).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 31_536_000;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state, built once at startup.
///
/// This is passed to all handlers and the image middleware via Axum's State
/// extractor.
pub struct AppState {
    /// Derivative generation and cache
    pub service: Arc<DerivativeService>,

    /// `Cache-Control` max-age for image responses, in seconds
    pub cache_max_age: u32,

    /// Limits for admin uploads
    pub upload_policy: Arc<UploadPolicy>,
}

impl AppState {
    /// Create application state with default cache max-age and upload policy.
    pub fn new(service: DerivativeService) -> Self {
        Self {
            service: Arc::new(service),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            upload_policy: Arc::new(UploadPolicy::default()),
        }
    }

    /// Set the image `Cache-Control` max-age.
    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    /// Set the upload policy.
    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = Arc::new(policy);
        self
    }

    /// `Cache-Control` header value for image responses.
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_max_age)
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache_max_age: self.cache_max_age,
            upload_policy: Arc::clone(&self.upload_policy),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "unsupported_type")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Response from the cache clear endpoint.
#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
}

/// Response from the single upload endpoint.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Public URL of the stored file
    pub url: String,

    /// Generated file name
    pub filename: String,
}

/// Response from the multi-upload endpoint.
#[derive(Debug, Serialize)]
pub struct MultiUploadResponse {
    /// Public URLs of the stored files, in upload order
    pub urls: Vec<String>,

    /// Number of stored files
    pub count: usize,
}

// =============================================================================
// Error Responses
// =============================================================================

/// Build a JSON error response, logging it by severity.
pub(crate) fn error_response(
    status: StatusCode,
    error_type: &'static str,
    message: String,
) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        // 404s are common and expected
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else if status.is_client_error() {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// Convert StoreError to HTTP response.
///
/// Rejected paths are reported as 404 so hidden files are indistinguishable
/// from missing ones.
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            StoreError::InvalidPath(_) => (StatusCode::NOT_FOUND, "not_found"),
            StoreError::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        };

        let message = match &self {
            StoreError::InvalidPath(path) => format!("Image not found: {}", path),
            other => other.to_string(),
        };

        error_response(status, error_type, message)
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            UploadError::MissingFile(_) => (StatusCode::BAD_REQUEST, "missing_file"),
            UploadError::UnsupportedType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_type")
            }
            UploadError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "file_too_large"),
            UploadError::BodyTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "body_too_large"),
            UploadError::TooManyFiles { .. } => (StatusCode::BAD_REQUEST, "too_many_files"),
            UploadError::Multipart(_) => (StatusCode::BAD_REQUEST, "invalid_multipart"),
            UploadError::Store(StoreError::Io { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            UploadError::Store(_) => (StatusCode::BAD_REQUEST, "invalid_file_name"),
        };

        error_response(status, error_type, self.to_string())
    }
}

fn multipart_error(err: MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::BodyTooLarge(err.body_text())
    } else {
        UploadError::Multipart(err.body_text())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Report the number and total size of cached derivatives.
///
/// # Endpoint
///
/// `GET /api/admin/image-cache/stats`
///
/// # Response
///
/// ```json
/// {
///   "file_count": 42,
///   "total_size": 1834221,
///   "total_size_mb": "1.75"
/// }
/// ```
pub async fn cache_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<CacheStats>, StoreError> {
    let stats = state.service.store().stats().await?;
    Ok(Json(stats))
}

/// Delete every cached derivative.
///
/// Derivatives are regenerated on demand afterwards.
///
/// # Endpoint
///
/// `DELETE /api/admin/image-cache`
pub async fn cache_clear_handler(
    State(state): State<AppState>,
) -> Result<Json<ClearCacheResponse>, StoreError> {
    let deleted_count = state.service.store().clear().await?;
    info!(deleted_count = deleted_count, "Image cache cleared");

    Ok(Json(ClearCacheResponse {
        success: true,
        message: format!("Cleared {} cached images", deleted_count),
        deleted_count,
    }))
}

/// Store a single uploaded image.
///
/// # Endpoint
///
/// `POST /api/admin/upload` with a multipart body containing the file in
/// field `image`.
///
/// # Response
///
/// ```json
/// { "url": "/uploads/product-1718000000000-3f2a9c1b7d4e.jpg", "filename": "product-1718000000000-3f2a9c1b7d4e.jpg" }
/// ```
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, UploadError> {
    let mut files = receive_files(&mut multipart, "image", 1).await?;
    let file = files.pop().ok_or(UploadError::MissingFile("image"))?;

    let stored = store_file(&state, &file).await?;

    Ok(Json(UploadResponse {
        url: stored.url,
        filename: stored.filename,
    }))
}

/// Store several uploaded images.
///
/// Every file is validated before any is written, so a rejected request
/// leaves nothing behind.
///
/// # Endpoint
///
/// `POST /api/admin/upload-multiple` with files in repeated field `images`.
pub async fn upload_multiple_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MultiUploadResponse>, UploadError> {
    let files = receive_files(&mut multipart, "images", state.upload_policy.max_files).await?;
    if files.is_empty() {
        return Err(UploadError::MissingFile("images"));
    }

    for file in &files {
        state
            .upload_policy
            .check(&file.content_type, file.data.len())?;
    }

    let mut urls = Vec::with_capacity(files.len());
    for file in &files {
        urls.push(store_file(&state, file).await?.url);
    }

    Ok(Json(MultiUploadResponse {
        count: urls.len(),
        urls,
    }))
}

// =============================================================================
// Upload Helpers
// =============================================================================

struct ReceivedFile {
    original_name: String,
    content_type: String,
    data: Bytes,
}

/// Read every part named `field`, ignoring other parts.
async fn receive_files(
    multipart: &mut Multipart,
    field: &'static str,
    limit: usize,
) -> Result<Vec<ReceivedFile>, UploadError> {
    let mut files = Vec::new();

    while let Some(part) = multipart.next_field().await.map_err(multipart_error)? {
        if part.name() != Some(field) {
            continue;
        }

        if files.len() >= limit {
            return Err(UploadError::TooManyFiles {
                count: files.len() + 1,
                limit,
            });
        }

        let original_name = part.file_name().unwrap_or("upload").to_string();
        let content_type = part
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = part.bytes().await.map_err(multipart_error)?;

        files.push(ReceivedFile {
            original_name,
            content_type,
            data,
        });
    }

    Ok(files)
}

async fn store_file(state: &AppState, file: &ReceivedFile) -> Result<StoredUpload, UploadError> {
    let stored = save_upload(
        state.service.store(),
        &state.upload_policy,
        &file.original_name,
        &file.content_type,
        &file.data,
    )
    .await?;

    info!(
        filename = %stored.filename,
        size = file.data.len(),
        "Image uploaded"
    );

    if let Some(options) = state.upload_policy.optimize {
        spawn_optimize(stored.path.clone(), options);
    }

    Ok(stored)
}

// =============================================================================
// Tests
// =============================================================================
