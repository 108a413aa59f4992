//! Multipart intake for upload rules.

use axum::extract::Multipart;
use serde::Serialize;
use tracing::{debug, error};

use super::error::ApiError;
use crate::file::{IncomingFile, StoredUpload, UploadRegistrar, UploadRule};

/// MIME type assumed when a part carries no `Content-Type`.
const DEFAULT_PART_MIMETYPE: &str = "application/octet-stream";

/// A stored upload as returned to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    /// Form field.
    pub field: String,
    /// Client-supplied file name.
    pub original_name: Option<String>,
    /// Generated file name.
    pub name: String,
    /// Path on disk.
    pub path: String,
    /// MIME type.
    pub mimetype: String,
    /// Size in bytes.
    pub size: u64,
}

impl From<&StoredUpload> for UploadResponse {
    fn from(upload: &StoredUpload) -> Self {
        Self {
            field: upload.field_name.clone(),
            original_name: upload.original_name.clone(),
            name: upload.name.clone(),
            path: upload.path.to_string_lossy().into_owned(),
            mimetype: upload.mimetype.clone(),
            size: upload.size,
        }
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    error!("Failed to read multipart data: {}", e);
    ApiError::bad_request("Invalid multipart data")
}

/// Read the files sent on `rule`'s field.
///
/// Count and size limits are checked while the body streams in, so an
/// oversized part is rejected without buffering it completely. Parts on
/// other fields are skipped.
pub async fn read_field(
    rule: &UploadRule,
    multipart: &mut Multipart,
) -> Result<Vec<IncomingFile>, ApiError> {
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(rule.field()) {
            continue;
        }

        rule.check_count(files.len())?;

        let original_name = field.file_name().map(str::to_string);
        let mimetype = field
            .content_type()
            .unwrap_or(DEFAULT_PART_MIMETYPE)
            .to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            rule.check_size((data.len() + chunk.len()) as u64)?;
            data.extend_from_slice(&chunk);
        }

        rule.check_mimetype(&mimetype)?;
        debug!(
            "Received {} bytes ({}) on field {}",
            data.len(),
            mimetype,
            rule.field()
        );

        files.push(IncomingFile {
            original_name,
            mimetype,
            data,
        });
    }

    Ok(files)
}

/// Read, validate, store and register the files on `rule`'s field.
pub async fn accept_multipart<R: UploadRegistrar>(
    rule: &UploadRule,
    mut multipart: Multipart,
    registrar: &mut R,
) -> Result<Vec<UploadResponse>, ApiError> {
    let files = read_field(rule, &mut multipart).await?;
    let stored = rule.accept(files, registrar).await?;
    Ok(stored.iter().map(UploadResponse::from).collect())
}
