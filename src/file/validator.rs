//! Upload validation rules.
//!
//! An [`UploadRule`] checks one form field in three stages: limits and the
//! MIME filter while parsing, the required-field check after parsing, and
//! finally registration of the stored files with an [`UploadRegistrar`].
//! No file is written unless every file on the field passes the filter.

use std::future::Future;
use std::path::Path;

use tracing::{debug, warn};

use super::metadata::{FileRepository, NewFileRecord};
use super::storage::{StorageParams, StoredUpload, UploadStorage};
use crate::config::UploadsConfig;
use crate::error::UploadRejection;
use crate::{Database, Result, StowageError};

/// Default per-file size limit (1MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default number of files per field.
pub const DEFAULT_MAX_FILES: usize = 1;

/// Allowed MIME types for a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MimeFilter {
    /// Any type passes.
    #[default]
    Any,
    /// Exactly this type passes.
    Exact(String),
    /// Types in the set pass; an empty set lets everything through.
    OneOf(Vec<String>),
}

impl MimeFilter {
    /// Check whether a MIME type passes the filter.
    pub fn allows(&self, mimetype: &str) -> bool {
        match self {
            MimeFilter::Any => true,
            MimeFilter::Exact(expected) => expected == mimetype,
            MimeFilter::OneOf(allowed) => {
                allowed.is_empty() || allowed.iter().any(|m| m == mimetype)
            }
        }
    }

    fn expected(&self) -> Vec<String> {
        match self {
            MimeFilter::Any => Vec::new(),
            MimeFilter::Exact(expected) => vec![expected.clone()],
            MimeFilter::OneOf(allowed) => allowed.clone(),
        }
    }
}

impl From<&str> for MimeFilter {
    fn from(mimetype: &str) -> Self {
        MimeFilter::Exact(mimetype.to_string())
    }
}

impl From<Vec<String>> for MimeFilter {
    fn from(mimetypes: Vec<String>) -> Self {
        MimeFilter::OneOf(mimetypes)
    }
}

impl From<&[&str]> for MimeFilter {
    fn from(mimetypes: &[&str]) -> Self {
        MimeFilter::OneOf(mimetypes.iter().map(|m| (*m).to_string()).collect())
    }
}

impl<T: Into<MimeFilter>> From<Option<T>> for MimeFilter {
    fn from(filter: Option<T>) -> Self {
        filter.map_or(MimeFilter::Any, Into::into)
    }
}

/// A file received on a form field, not yet written.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    /// Client-supplied file name.
    pub original_name: Option<String>,
    /// Reported MIME type.
    pub mimetype: String,
    /// File contents.
    pub data: Vec<u8>,
}

impl IncomingFile {
    /// Create an incoming file.
    pub fn new(mimetype: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            original_name: None,
            mimetype: mimetype.into(),
            data: data.into(),
        }
    }

    /// Set the client-supplied file name.
    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = Some(name.into());
        self
    }
}

/// Downstream bookkeeping for files accepted on a field.
pub trait UploadRegistrar {
    /// Record the files stored for `field`.
    fn register(
        &mut self,
        field: &str,
        files: &[StoredUpload],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Per-request record of uploaded files.
#[derive(Debug, Clone, Default)]
pub struct RequestUploads {
    /// Whether any file upload was registered.
    pub is_file: bool,
    /// Files stored during the request.
    pub saved_files: Vec<StoredUpload>,
}

impl RequestUploads {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }
}

impl UploadRegistrar for RequestUploads {
    async fn register(&mut self, _field: &str, files: &[StoredUpload]) -> Result<()> {
        if !files.is_empty() {
            self.is_file = true;
            self.saved_files.extend_from_slice(files);
        }
        Ok(())
    }
}

/// Registrar that also creates a file record for every stored upload.
pub struct StoreRegistrar<'a> {
    db: &'a Database,
    user_id: Option<i64>,
    uploads: RequestUploads,
}

impl<'a> StoreRegistrar<'a> {
    /// Create a registrar writing to `db`.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            user_id: None,
            uploads: RequestUploads::new(),
        }
    }

    /// Attribute created records to a user.
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Uploads registered so far.
    pub fn uploads(&self) -> &RequestUploads {
        &self.uploads
    }

    /// Consume the registrar, returning the request record.
    pub fn into_uploads(self) -> RequestUploads {
        self.uploads
    }
}

impl UploadRegistrar for StoreRegistrar<'_> {
    async fn register(&mut self, field: &str, files: &[StoredUpload]) -> Result<()> {
        let repo = FileRepository::new(self.db.pool());
        let mut created = Vec::with_capacity(files.len());

        for file in files {
            match create_record(&repo, file, self.user_id).await {
                Ok(file_id) => created.push(file_id),
                Err(e) => {
                    retract(&repo, &created).await;
                    return Err(e);
                }
            }
        }

        self.uploads.register(field, files).await
    }
}

async fn create_record(
    repo: &FileRepository<'_>,
    file: &StoredUpload,
    user_id: Option<i64>,
) -> Result<i64> {
    let size = i64::try_from(file.size)
        .map_err(|_| StowageError::Config(format!("file size out of range: {}", file.size)))?;
    let mut record =
        NewFileRecord::new(&file.name, &file.mimetype, size, file.path.to_string_lossy());
    if let Some(user_id) = user_id {
        record = record.with_user(user_id);
    }
    Ok(repo.create(&record).await?.file_id)
}

/// Soft-delete records created for a batch that is being discarded.
async fn retract(repo: &FileRepository<'_>, created: &[i64]) {
    for &file_id in created {
        if let Err(e) = repo.mark_deleted(file_id).await {
            warn!("Failed to retract file record {}: {}", file_id, e);
        }
    }
}

/// Validation and storage rule for one form field.
#[derive(Debug, Clone)]
pub struct UploadRule {
    field: String,
    required: bool,
    filter: MimeFilter,
    max_files: usize,
    max_file_size: u64,
    storage: UploadStorage,
}

impl UploadRule {
    /// Start building a rule for `field`.
    pub fn builder(field: impl Into<String>) -> UploadRuleBuilder {
        UploadRuleBuilder::new(field)
    }

    /// Field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Whether at least one file is required.
    pub fn required(&self) -> bool {
        self.required
    }

    /// MIME filter.
    pub fn filter(&self) -> &MimeFilter {
        &self.filter
    }

    /// Maximum number of files.
    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Maximum bytes per file.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Storage files are written to.
    pub fn storage(&self) -> &UploadStorage {
        &self.storage
    }

    fn reject(&self, reason: UploadRejection) -> StowageError {
        StowageError::invalid_field(&self.field, reason)
    }

    /// Check that one more file fits the count limit, given `received` so far.
    pub fn check_count(&self, received: usize) -> Result<()> {
        if received >= self.max_files {
            return Err(self.reject(UploadRejection::TooManyFiles {
                limit: self.max_files,
            }));
        }
        Ok(())
    }

    /// Check a (possibly partial) file size against the per-file limit.
    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_file_size {
            return Err(self.reject(UploadRejection::FileTooLarge {
                limit: self.max_file_size,
                size,
            }));
        }
        Ok(())
    }

    /// Check a single file's MIME type.
    pub fn check_mimetype(&self, mimetype: &str) -> Result<()> {
        if !self.filter.allows(mimetype) {
            return Err(self.reject(UploadRejection::MimeType {
                expected: self.filter.expected(),
                actual: mimetype.to_string(),
            }));
        }
        Ok(())
    }

    /// Fail when the field is required and no file arrived.
    pub fn check_required(&self, received: usize) -> Result<()> {
        if self.required && received == 0 {
            return Err(self.reject(UploadRejection::MissingFile));
        }
        Ok(())
    }

    /// Run every check over already-received files.
    pub fn validate(&self, files: &[IncomingFile]) -> Result<()> {
        for (i, file) in files.iter().enumerate() {
            self.check_count(i)?;
            self.check_size(file.data.len() as u64)?;
        }
        for file in files {
            self.check_mimetype(&file.mimetype)?;
        }
        self.check_required(files.len())
    }

    /// Validate, store and register the files received on this field.
    ///
    /// Files already written are removed again if a later write fails.
    pub async fn accept<R: UploadRegistrar>(
        &self,
        files: Vec<IncomingFile>,
        registrar: &mut R,
    ) -> Result<Vec<StoredUpload>> {
        if let Err(e) = self.validate(&files) {
            warn!("Rejected uploads on field {}: {}", self.field, e);
            return Err(e);
        }

        let mut stored = Vec::with_capacity(files.len());
        for file in &files {
            let result = self
                .storage
                .store(
                    &self.field,
                    file.original_name.as_deref(),
                    &file.mimetype,
                    &file.data,
                )
                .await;

            match result {
                Ok(upload) => stored.push(upload),
                Err(e) => {
                    discard(&stored).await;
                    return Err(e);
                }
            }
        }

        debug!("Stored {} file(s) on field {}", stored.len(), self.field);

        if let Err(e) = registrar.register(&self.field, &stored).await {
            discard(&stored).await;
            return Err(e);
        }
        Ok(stored)
    }
}

async fn discard(stored: &[StoredUpload]) {
    for upload in stored {
        if let Err(e) = tokio::fs::remove_file(&upload.path).await {
            warn!("Failed to remove {:?}: {}", upload.path, e);
        }
    }
}

/// Builder for [`UploadRule`].
#[derive(Debug, Clone)]
pub struct UploadRuleBuilder {
    field: String,
    required: bool,
    filter: MimeFilter,
    max_files: usize,
    max_file_size: u64,
    params: StorageParams,
}

impl UploadRuleBuilder {
    /// Create a builder with default limits and no filter.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            required: false,
            filter: MimeFilter::Any,
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            params: StorageParams::default(),
        }
    }

    /// Require at least one file.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Set the MIME filter.
    pub fn mimetypes(mut self, filter: impl Into<MimeFilter>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Set the maximum number of files (0 falls back to the default).
    pub fn max_files(mut self, max_files: usize) -> Self {
        self.max_files = if max_files == 0 {
            DEFAULT_MAX_FILES
        } else {
            max_files
        };
        self
    }

    /// Set the per-file size limit (0 falls back to the default).
    pub fn max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = if max_file_size == 0 {
            DEFAULT_MAX_FILE_SIZE
        } else {
            max_file_size
        };
        self
    }

    /// Take count and size limits from configuration.
    pub fn limits(self, config: &UploadsConfig) -> Self {
        self.max_files(config.max_files)
            .max_file_size(config.max_file_size)
    }

    /// Set the storage parameters.
    pub fn storage(mut self, params: StorageParams) -> Self {
        self.params = params;
        self
    }

    /// Build the rule, preparing its destination under `uploads_root`.
    pub fn build(self, uploads_root: impl AsRef<Path>) -> Result<UploadRule> {
        let storage = UploadStorage::new(uploads_root, self.params.clone())?;
        Ok(self.finish(storage))
    }

    /// Build the rule with an already configured storage.
    pub fn build_with_storage(self, storage: UploadStorage) -> UploadRule {
        self.finish(storage)
    }

    fn finish(self, storage: UploadStorage) -> UploadRule {
        UploadRule {
            field: self.field,
            required: self.required,
            filter: self.filter,
            max_files: self.max_files,
            max_file_size: self.max_file_size,
            storage,
        }
    }
}

/// Image-only presets.
pub mod presets {
    use super::UploadRuleBuilder;

    /// JPEG MIME types.
    pub const JPG: &[&str] = &["image/jpeg", "image/jpg"];
    /// JPEG or PNG MIME types.
    pub const JPG_PNG: &[&str] = &["image/jpeg", "image/jpg", "image/png"];
    /// PNG MIME type.
    pub const PNG: &[&str] = &["image/png"];

    /// JPEG-only field.
    pub fn jpg(field: impl Into<String>) -> UploadRuleBuilder {
        UploadRuleBuilder::new(field).mimetypes(JPG)
    }

    /// JPEG-or-PNG field.
    pub fn jpg_png(field: impl Into<String>) -> UploadRuleBuilder {
        UploadRuleBuilder::new(field).mimetypes(JPG_PNG)
    }

    /// PNG-only field.
    pub fn png(field: impl Into<String>) -> UploadRuleBuilder {
        UploadRuleBuilder::new(field).mimetypes(PNG)
    }
}
