//! API error handling for stowage upload endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::{StatusKind, StowageError};

/// API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad request (400).
    BadRequest,
    /// Conflict (409).
    Conflict,
    /// Internal server error (500).
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_status(status: StatusKind) -> Self {
        match status {
            StatusKind::InvalidField => ErrorCode::BadRequest,
            StatusKind::RepeatedQuery => ErrorCode::Conflict,
            StatusKind::ServerError => ErrorCode::InternalError,
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error detail.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code.
    pub code: ErrorCode,
    /// Symbolic status (`invalid_field`, `server_error`, `repeated_query`).
    pub status: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Field-level details (only present for field errors).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusKind,
    message: String,
    details: Option<HashMap<String, Vec<String>>>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusKind, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::from_status(status),
            status,
            message: message.into(),
            details: None,
        }
    }

    /// Create a field error with details for `field`.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut details = HashMap::new();
        details.insert(field.into(), vec![message.clone()]);
        Self {
            details: Some(details),
            ..Self::new(StatusKind::InvalidField, message)
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InvalidField, message)
    }

    /// Create an internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusKind::ServerError, message)
    }

    /// Error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Symbolic status.
    pub fn status(&self) -> StatusKind {
        self.status
    }

    /// Message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                status: self.status.as_str(),
                message: self.message,
                details: self.details,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<StowageError> for ApiError {
    fn from(err: StowageError) -> Self {
        match err {
            StowageError::InvalidField { field, reason } => {
                ApiError::invalid_field(field, reason.to_string())
            }
            StowageError::RepeatedQuery(_) => {
                ApiError::new(StatusKind::RepeatedQuery, err.to_string())
            }
            _ => {
                tracing::error!("Internal error: {}", err);
                ApiError::internal("An internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadRejection;

    #[test]
    fn test_error_code_status() {
        assert_eq!(ErrorCode::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_invalid_field() {
        let err: ApiError =
            StowageError::invalid_field("avatar", UploadRejection::MissingFile).into();

        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert_eq!(err.status(), StatusKind::InvalidField);
        let details = err.details.unwrap();
        assert_eq!(
            details.get("avatar").unwrap(),
            &vec!["required file is missing".to_string()]
        );
    }

    #[test]
    fn test_from_repeated_query() {
        let err: ApiError = StowageError::RepeatedQuery("p/a.txt".to_string()).into();

        assert_eq!(err.code(), ErrorCode::Conflict);
        assert!(err.message().contains("p/a.txt"));
    }

    #[test]
    fn test_server_errors_are_hidden() {
        let err: ApiError = StowageError::Database("secret detail".to_string()).into();

        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.status(), StatusKind::ServerError);
        assert!(!err.message().contains("secret"));
    }

    #[test]
    fn test_into_response_status() {
        let response = ApiError::bad_request("bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
