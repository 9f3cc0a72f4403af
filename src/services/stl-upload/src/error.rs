use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Result type alias for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Main error type for the upload service
#[derive(Error, Debug)]
pub enum UploadError {
    // Client input errors
    #[error("No file uploaded")]
    MissingFile,

    #[error("Only .{extension} files are allowed")]
    InvalidExtension { extension: String },

    #[error("Unexpected field")]
    UnexpectedField { field: String },

    #[error("{message}")]
    Multipart { message: String, status: StatusCode },

    // Environment errors
    #[error("{message}")]
    StorageFailure { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl UploadError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::MissingFile => StatusCode::BAD_REQUEST,
            UploadError::Multipart { status, .. } => *status,
            UploadError::InvalidExtension { .. }
            | UploadError::UnexpectedField { .. }
            | UploadError::StorageFailure { .. }
            | UploadError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            UploadError::MissingFile => "MISSING_FILE",
            UploadError::InvalidExtension { .. } => "INVALID_EXTENSION",
            UploadError::UnexpectedField { .. } => "UNEXPECTED_FIELD",
            UploadError::Multipart { .. } => "MULTIPART_ERROR",
            UploadError::StorageFailure { .. } => "STORAGE_FAILURE",
            UploadError::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
        }
    }

    pub fn invalid_extension<S: Into<String>>(extension: S) -> Self {
        Self::InvalidExtension {
            extension: extension.into(),
        }
    }

    pub fn storage_failure<S: Into<String>>(message: S) -> Self {
        Self::StorageFailure {
            message: message.into(),
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.error_code(), "Server error: {}", self);
        } else {
            warn!(code = self.error_code(), "Rejected request: {}", self);
        }
        (status, Json(self.to_error_response())).into_response()
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::StorageFailure {
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        // Only a configured body limit keeps its own status; every other
        // parser failure goes down the generic 500 path.
        let status = match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        UploadError::Multipart {
            message: err.body_text(),
            status,
        }
    }
}

impl From<config::ConfigError> for UploadError {
    fn from(err: config::ConfigError) -> Self {
        UploadError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for UploadError {
    fn from(err: tokio::task::JoinError) -> Self {
        UploadError::StorageFailure {
            message: format!("Storage task failed: {}", err),
        }
    }
}
