//! Error types for mockd core

/// Result type alias for mockd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for mockd
///
/// Every variant maps to one of the stable machine codes surfaced by the
/// admin API, plus an HTTP status class.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("duplicate id: {id}")]
    DuplicateId { id: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("unavailable: {message}")]
    Unavailable { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error tied to a specific field
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine code for the admin error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::InvalidJson { .. } | Self::Json(_) => "invalid_json",
            Self::NotFound { .. } => "not_found",
            Self::DuplicateId { .. } => "duplicate_id",
            Self::Conflict { .. } => "conflict",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Unavailable { .. } => "unavailable",
            _ => "internal",
        }
    }

    /// Canonical HTTP status for the error class
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::InvalidJson { .. } | Self::Json(_) => 400,
            Self::NotFound { .. } => 404,
            Self::MethodNotAllowed => 405,
            Self::DuplicateId { .. } | Self::Conflict { .. } => 409,
            Self::Unavailable { .. } => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_status_classes() {
        assert_eq!(Error::validation("x").code(), "validation_error");
        assert_eq!(Error::validation("x").http_status(), 400);
        assert_eq!(Error::not_found("mock").code(), "not_found");
        assert_eq!(Error::not_found("mock").http_status(), 404);
        assert_eq!(
            Error::DuplicateId { id: "a".into() }.http_status(),
            409
        );
        assert_eq!(Error::conflict("busy").code(), "conflict");
        assert_eq!(Error::unavailable("full").http_status(), 503);
    }
}
