//! Error types for stowage.

use std::fmt;

use thiserror::Error;

/// Symbolic status vocabulary shared with the HTTP layer.
///
/// Only the three kinds matter to this crate; numeric codes are chosen by the
/// caller's response layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// A submitted field is missing, malformed or violates a limit.
    InvalidField,
    /// The server is misconfigured or an internal operation failed.
    ServerError,
    /// The request collides with an existing record.
    RepeatedQuery,
}

impl StatusKind {
    /// Symbolic name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::InvalidField => "invalid_field",
            StatusKind::ServerError => "server_error",
            StatusKind::RepeatedQuery => "repeated_query",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an upload field was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    /// The field is required but carried no files.
    MissingFile,
    /// A file's MIME type is not in the allowed set.
    MimeType {
        /// Allowed MIME types (empty means "any").
        expected: Vec<String>,
        /// MIME type reported for the file.
        actual: String,
    },
    /// More files arrived than the field allows.
    TooManyFiles {
        /// Maximum number of files.
        limit: usize,
    },
    /// A single file exceeds the per-file byte limit.
    FileTooLarge {
        /// Maximum size in bytes.
        limit: u64,
        /// Bytes received before rejection.
        size: u64,
    },
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadRejection::MissingFile => write!(f, "required file is missing"),
            UploadRejection::MimeType { expected, actual } => {
                write!(f, "mimetype {actual} not allowed (expected {})", expected.join(", "))
            }
            UploadRejection::TooManyFiles { limit } => {
                write!(f, "too many files (at most {limit})")
            }
            UploadRejection::FileTooLarge { limit, size } => {
                write!(f, "file too large ({size} bytes, limit {limit})")
            }
        }
    }
}

/// Common error type for stowage.
#[derive(Error, Debug)]
pub enum StowageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An upload field failed validation.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Form field name.
        field: String,
        /// Rejection detail.
        reason: UploadRejection,
    },

    /// A file path is already registered by an active record.
    #[error("file path is not unique: {0}")]
    RepeatedQuery(String),

    /// The requested static directory key is not configured.
    #[error("invalid static directory for saving file: {key} (available: {})", available.join(", "))]
    UnknownStaticDir {
        /// Requested key.
        key: String,
        /// Configured keys.
        available: Vec<String>,
    },

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Archive creation failed.
    #[error("archive error: {0}")]
    Archive(String),
}

impl StowageError {
    /// Create an invalid-field error.
    pub fn invalid_field(field: impl Into<String>, reason: UploadRejection) -> Self {
        StowageError::InvalidField {
            field: field.into(),
            reason,
        }
    }

    /// Status kind reported to the HTTP layer.
    pub fn status(&self) -> StatusKind {
        match self {
            StowageError::InvalidField { .. } => StatusKind::InvalidField,
            StowageError::RepeatedQuery(_) => StatusKind::RepeatedQuery,
            _ => StatusKind::ServerError,
        }
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for StowageError {
    fn from(e: sqlx::Error) -> Self {
        StowageError::Database(e.to_string())
    }
}

impl From<zip::result::ZipError> for StowageError {
    fn from(e: zip::result::ZipError) -> Self {
        StowageError::Archive(e.to_string())
    }
}

/// Result type alias for stowage operations.
pub type Result<T> = std::result::Result<T, StowageError>;
