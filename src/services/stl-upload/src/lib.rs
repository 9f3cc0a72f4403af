//! # STL Upload Service
//!
//! Small HTTP service that accepts one `.stl` model per request as
//! multipart/form-data, stores it under `uploads/` with a timestamped,
//! sanitised name and reports where it went.
//!
//! ## Endpoints
//!
//! - `GET /` liveness text
//! - `GET /health` upload directory health
//! - `POST /upload` multipart upload, file part named `stl`
//! - `OPTIONS *` CORS preflight
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stl_upload_service::{build_state, create_router, UploadServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = UploadServiceConfig::load(None, std::env::var("PORT").ok())?;
//!     let state = build_state(config).await?;
//!     let listener = tokio::net::TcpListener::bind(state.config.bind_address()).await?;
//!     axum::serve(listener, create_router(state)).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub mod config_types;
pub mod error;
pub mod handlers;
pub mod middleware_cors;
pub mod models;
pub mod services;
pub mod utils;


pub use config_types::UploadServiceConfig;
pub use error::{UploadError, UploadResult};
pub use models::{StoredFile, UploadDirectory, UploadResponse};
pub use services::StorageService;

/// Version information for the upload service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVICE_NAME: &str = "stl-upload-service";

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub storage_service: Arc<StorageService>,
    pub config: Arc<UploadServiceConfig>,
}

/// Prepare the upload directory and assemble the shared state
pub async fn build_state(config: UploadServiceConfig) -> UploadResult<AppState> {
    let storage_service = StorageService::new(&config.storage).await?;

    Ok(AppState {
        storage_service: Arc::new(storage_service),
        config: Arc::new(config),
    })
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let body_limit = match state.config.server.max_request_size {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/upload", post(handlers::upload_file))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::from_fn(middleware_cors::cors_middleware))
                .layer(body_limit),
        )
        .with_state(state)
}
