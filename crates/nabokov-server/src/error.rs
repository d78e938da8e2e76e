//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nabokov_provider::ProviderError;
use serde_json::json;

/// Errors returned by the API handlers before a response body is streamed.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body was not valid JSON
    #[error("Invalid JSON body: {0}")]
    MalformedBody(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Provider(ProviderError::UnsupportedMultimodal) => {
                StatusCode::NOT_IMPLEMENTED
            }
            ApiError::Provider(err) if err.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Provider(ProviderError::UnsupportedMultimodal) => json!({
                "error": self.to_string(),
                "fallbackToDirect": true,
            }),
            ApiError::Provider(err) if status.is_server_error() => {
                tracing::error!(code = err.code(), error = %err, "request failed");
                json!({
                    "error": err.to_string(),
                    "details": {
                        "code": err.code(),
                        "requestedModel": err.requested_model(),
                    },
                })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
