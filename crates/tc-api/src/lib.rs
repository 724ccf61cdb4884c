//! # tc-api
//!
//! The HTTP routing and orchestration layer for the time capsule service.

pub mod dto;
pub mod error;
pub mod form;
pub mod handlers;
pub mod middleware;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::AppState;

/// Knobs for the router that come from settings.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Upper bound for a request body, multipart uploads included.
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: 25 * 1024 * 1024,
            allowed_origins: Vec::new(),
        }
    }
}

/// Builds the API router with its middleware stack.
pub fn router(state: AppState, options: &RouterOptions) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route(
            "/api/capsules",
            get(handlers::list_capsules).post(handlers::create_capsule),
        )
        .route("/api/capsules/json", post(handlers::create_capsule_json))
        .route(
            "/api/capsules/{id}",
            get(handlers::get_capsule).delete(handlers::delete_capsule),
        )
        .route("/api/capsules/{id}/unlock", post(handlers::unlock_capsule))
        .route(
            "/api/capsules/{id}/files/{file_id}",
            get(handlers::download_file),
        )
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(middleware::cors_policy(&options.allowed_origins))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
