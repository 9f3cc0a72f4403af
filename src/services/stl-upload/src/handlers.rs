//! HTTP request handlers for the upload service

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use tracing::{debug, info};

use crate::{
    error::{UploadError, UploadResult},
    models::{HealthResponse, UploadResponse},
    services::StagedUpload,
    utils::path,
    AppState,
};

/// Liveness endpoint
pub async fn index() -> &'static str {
    "Upload server running"
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.storage_service.health_check().await.is_ok();

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        upload_dir: state
            .storage_service
            .upload_dir()
            .path()
            .display()
            .to_string(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Accept exactly one file under the configured field name and store it.
///
/// The extension is checked before any byte reaches the disk, and the
/// staging file is discarded if anything later in the body is rejected.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> UploadResult<Json<UploadResponse>> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!("Request body is not multipart: {}", rejection);
            return Err(UploadError::MissingFile);
        }
    };

    let storage = &state.config.storage;
    let mut accepted: Option<(String, StagedUpload)> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();

        // Parts without a filename are plain form fields
        let original_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                debug!("Ignoring form field {}", field_name);
                continue;
            }
        };

        if field_name != storage.field_name || accepted.is_some() {
            return Err(UploadError::UnexpectedField { field: field_name });
        }

        if !path::has_extension(&original_name, &storage.allowed_extension) {
            return Err(UploadError::invalid_extension(
                storage.allowed_extension.trim_start_matches('.'),
            ));
        }

        let mut staged = state.storage_service.begin_upload().await?;
        while let Some(chunk) = field.chunk().await? {
            staged.write_chunk(&chunk).await?;
        }

        debug!("Received {} ({} bytes)", original_name, staged.size());
        accepted = Some((original_name, staged));
    }

    let (original_name, staged) = accepted.ok_or(UploadError::MissingFile)?;
    let stored = state
        .storage_service
        .commit(staged, &original_name)
        .await?;

    info!("Upload accepted: {}", stored.relative_path);
    Ok(Json(UploadResponse::from(&stored)))
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}
