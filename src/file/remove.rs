//! File removal with soft-delete of the file record.

use std::fmt;

use tracing::{info, warn};

use super::metadata::{FileRecord, FileRepository};
use super::validator::RequestUploads;
use crate::{Database, Result};

/// Identifies a file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    /// Record ID.
    Id(i64),
    /// Exact path; surrounding whitespace is ignored.
    Path(String),
}

impl From<i64> for FileRef {
    fn from(id: i64) -> Self {
        FileRef::Id(id)
    }
}

impl From<&str> for FileRef {
    fn from(path: &str) -> Self {
        FileRef::Path(path.to_string())
    }
}

impl From<String> for FileRef {
    fn from(path: String) -> Self {
        FileRef::Path(path)
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRef::Id(id) => write!(f, "file {id}"),
            FileRef::Path(path) => write!(f, "file at {}", path.trim()),
        }
    }
}

/// Removes files from disk and soft-deletes their records.
#[derive(Debug, Clone)]
pub struct FileRemover {
    db: Database,
}

impl FileRemover {
    /// Create a remover.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Remove one file.
    ///
    /// A missing record is logged and treated as success. Filesystem errors
    /// are returned and leave the record untouched.
    pub async fn remove(&self, file: impl Into<FileRef>) -> Result<Option<FileRecord>> {
        let file = file.into();
        let repo = FileRepository::new(self.db.pool());

        let record = match file {
            FileRef::Id(id) => repo.get_by_id(id).await?.filter(|r| !r.deleted),
            FileRef::Path(ref path) => repo.get_active_by_path(path.trim()).await?,
        };

        let Some(record) = record else {
            info!("File not found: {}", file);
            return Ok(None);
        };

        tokio::fs::remove_file(&record.path).await?;
        repo.mark_deleted(record.file_id).await?;
        info!("Removed {} ({})", file, record.path);

        repo.get_by_id(record.file_id).await
    }
}

/// Remove every file registered on a request.
///
/// Each failure is logged and skipped so the whole batch runs.
pub async fn remove_request_uploads(remover: &FileRemover, uploads: &RequestUploads) {
    if !uploads.is_file {
        return;
    }

    for upload in &uploads.saved_files {
        let path = upload.path.to_string_lossy().into_owned();
        if let Err(e) = remover.remove(path.as_str()).await {
            warn!("Failed to remove {}: {}", path, e);
        }
    }
}
