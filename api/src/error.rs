use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error body for everything outside the agent protocol itself.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub request_id: String,
}

#[derive(Debug)]
pub enum AppError {
    /// Resource not configured or unknown (404)
    NotFound { message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::NotFound { message } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: "not_found".to_string(),
                    message,
                    request_id,
                },
            ),
        };

        tracing::debug!(
            status = status.as_u16(),
            error = %api_error.error,
            request_id = %api_error.request_id,
            "Returning API error"
        );
        (status, Json(api_error)).into_response()
    }
}
