//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error type
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    /// JSON body shared by HTTP responses and WebSocket error messages.
    pub fn body(&self) -> serde_json::Value {
        json!({
            "error": {
                "message": self.message,
                "code": self.status.as_u16()
            }
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(self.body());
        (self.status, body).into_response()
    }
}

impl From<tokstream_core::Error> for ApiError {
    fn from(err: tokstream_core::Error) -> Self {
        match &err {
            tokstream_core::Error::VoiceNotFound(_) => ApiError::not_found(err.to_string()),
            tokstream_core::Error::ConfigError(_) | tokstream_core::Error::PromptError(_) => {
                ApiError::bad_request(err.to_string())
            }
            tokstream_core::Error::BackendUnavailable(_) => ApiError::unavailable(err.to_string()),
            tokstream_core::Error::BackendError(_) | tokstream_core::Error::HttpError(_) => {
                ApiError::bad_gateway(err.to_string())
            }
            _ => ApiError::internal(err.to_string()),
        }
    }
}
