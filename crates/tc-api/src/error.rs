//! Maps service errors onto HTTP responses with a `{"error": ...}` body.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tc_core::AppError;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    /// Malformed multipart body, or one over the configured size limit.
    Multipart(MultipartError),
    Json(JsonRejection),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::App(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Multipart(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::Json(err)
    }
}

fn app_status(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::Locked(_) => StatusCode::FORBIDDEN,
        AppError::Storage(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::App(err) if err.is_client_error() => (app_status(err), err.to_string()),
            Self::App(err) => {
                error!(error = %err, "request failed");
                (app_status(err), "internal server error".to_owned())
            }
            Self::Multipart(err) => (err.status(), err.body_text()),
            Self::Json(err) => (err.status(), err.body_text()),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
