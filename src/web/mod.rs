//! Web intake for stowage.
//!
//! Routing belongs to the embedding application; this module provides the
//! multipart reader for upload rules and the JSON error response.

pub mod error;
pub mod upload;

pub use error::{ApiError, ErrorCode};
pub use upload::{accept_multipart, read_field, UploadResponse};
