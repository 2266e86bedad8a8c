//! Error handling for the REST API server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use cutlist_core::error::CutlistError;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    // Common error constructors
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

// Convert from cutlist-core errors
impl From<CutlistError> for ApiError {
    fn from(err: CutlistError) -> Self {
        let code = err.code().as_str();
        let suggestion = err.suggestion().map(str::to_string);
        let message = err.to_string();

        let status = match &err {
            CutlistError::Input { .. } => StatusCode::BAD_REQUEST,
            // A job that failed on bad input is the caller's problem.
            CutlistError::Fatal { .. } if err.input_cause().is_some() => StatusCode::BAD_REQUEST,
            CutlistError::Fatal { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CutlistError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            CutlistError::Cancelled(_) => StatusCode::CONFLICT,
            CutlistError::DegradedMode { .. } | CutlistError::ProviderTransient { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CutlistError::ProviderRejection { .. } => StatusCode::BAD_GATEWAY,
            CutlistError::Configuration(_)
            | CutlistError::Io(_)
            | CutlistError::Serialization(_)
            | CutlistError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut api = ApiError::new(status, code, message);
        if let Some(suggestion) = suggestion {
            api = api.with_details(serde_json::json!({ "suggestion": suggestion }));
        }
        api
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
