//! Binary-crate error type for failures that occur before a JSON-RPC
//! envelope exists (bad config, unreadable file).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to read config file: {0}")]
    ConfigRead(String),
    #[error("failed to parse config: {0}")]
    ConfigParse(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::ConfigRead(_) | ApiError::ConfigParse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        };
        let body = Json(serde_json::json!({
            "error": { "code": code, "message": self.to_string() }
        }));
        (status, body).into_response()
    }
}
