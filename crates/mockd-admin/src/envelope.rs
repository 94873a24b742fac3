//! Admin error envelope
//!
//! Every admin error renders as `{error, message, details?}` with the
//! canonical HTTP status for its class.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

/// The wire shape of an admin error
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    /// Stable machine code
    pub error: String,
    /// Human-readable description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Admin handler error carrying the envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    envelope: ErrorEnvelope,
}

/// Result alias for admin handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl From<mockd_core::Error> for ApiError {
    fn from(error: mockd_core::Error) -> Self {
        let details = match &error {
            mockd_core::Error::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({"field": field})),
            mockd_core::Error::DuplicateId { id } => Some(serde_json::json!({"id": id})),
            _ => None,
        };
        Self {
            status: StatusCode::from_u16(error.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            envelope: ErrorEnvelope {
                error: error.code().to_string(),
                message: error.to_string(),
                details,
            },
        }
    }
}

impl ApiError {
    /// Build a bad-request envelope for malformed JSON bodies
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            envelope: ErrorEnvelope {
                error: "invalid_json".to_string(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Build a validation envelope
    pub fn validation(message: impl Into<String>) -> Self {
        mockd_core::Error::validation(message.into()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_envelopes() {
        let api: ApiError = mockd_core::Error::not_found("mock 'x'").into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.envelope.error, "not_found");

        let api: ApiError = mockd_core::Error::DuplicateId { id: "a".into() }.into();
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.envelope.details, Some(serde_json::json!({"id": "a"})));
    }
}
