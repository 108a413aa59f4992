//! Programmatic file saving.
//!
//! [`FileSaver::save`] writes byte buffers below a named static directory
//! and upserts a [`FileRecord`] for every path. Each file gets its own
//! [`SaveStatus`]; only an unknown static directory fails the whole call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{is_contained, staging_path};
use super::metadata::{FileRecord, FileRecordUpdate, FileRepository, NewFileRecord};
use super::naming::{mime_subtype, normalize_extension, NamingPolicy};
use crate::config::{SaveConfig, StaticDirConfig, StaticFilesConfig};
use crate::{Database, Result, StowageError};

/// Random digits in names synthesized by [`FileSaver`].
const SAVE_RANDOM_DIGITS: u32 = 2;

/// Static directory keys mapped to physical roots.
#[derive(Debug, Clone)]
pub struct StaticDirectories {
    root: PathBuf,
    dirs: Vec<StaticDirConfig>,
}

impl StaticDirectories {
    /// Create a mapping resolved against `root`.
    pub fn new(root: impl Into<PathBuf>, dirs: Vec<StaticDirConfig>) -> Self {
        Self {
            root: root.into(),
            dirs,
        }
    }

    /// Create a mapping from configuration.
    pub fn from_config(config: &StaticFilesConfig) -> Self {
        Self::new(&config.root, config.dirs.clone())
    }

    /// Configured keys, in order.
    pub fn keys(&self) -> Vec<String> {
        self.dirs.iter().map(|d| d.local.clone()).collect()
    }

    /// Physical directory for a key.
    pub fn resolve(&self, key: &str) -> Result<PathBuf> {
        self.dirs
            .iter()
            .find(|d| d.local == key)
            .map(|d| d.physical_path(&self.root))
            .ok_or_else(|| StowageError::UnknownStaticDir {
                key: key.to_string(),
                available: self.keys(),
            })
    }
}

/// A buffer to save, with optional per-file overrides.
#[derive(Debug, Clone, Default)]
pub struct UploadDescriptor {
    /// Contents. Nothing is written when absent.
    pub data: Option<Vec<u8>>,
    /// MIME type.
    pub mimetype: Option<String>,
    /// Static directory key.
    pub static_dir: Option<String>,
    /// Subdirectory below the static directory.
    pub dir: Option<String>,
    /// File name.
    pub name: Option<String>,
    /// Full path, bypassing static directory resolution.
    pub path: Option<PathBuf>,
    /// Extension for a synthesized name.
    pub file_extension: Option<String>,
    /// Size to record instead of the buffer length.
    pub size: Option<u64>,
    /// Creating user.
    pub user_id: Option<i64>,
}

impl UploadDescriptor {
    /// Create a descriptor carrying `data`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// Create a descriptor without data (record only).
    pub fn without_data() -> Self {
        Self::default()
    }

    /// Set the MIME type.
    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Set the static directory key.
    pub fn with_static_dir(mut self, static_dir: impl Into<String>) -> Self {
        self.static_dir = Some(static_dir.into());
        self
    }

    /// Set the subdirectory.
    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Set the file name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the full path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    /// Set the recorded size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the creating user.
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// A batch of files plus call-level defaults.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// Files to save.
    pub files: Vec<UploadDescriptor>,
    /// Default subdirectory.
    pub dir: String,
    /// Prefix for synthesized names.
    pub name_prefix: String,
    /// Default MIME type.
    pub mimetype: String,
    /// Default extension.
    pub file_extension: Option<String>,
    /// Default creating user.
    pub user_id: Option<i64>,
    /// Create missing parent directories.
    pub recursive: bool,
    /// Replace files whose path is already registered.
    pub overwrite: bool,
    /// Default static directory key.
    pub static_dir: String,
}

impl SaveRequest {
    /// Create a request with built-in defaults.
    pub fn new(files: Vec<UploadDescriptor>) -> Self {
        Self::from_config(&SaveConfig::default(), files)
    }

    /// Create a request with defaults from configuration.
    pub fn from_config(config: &SaveConfig, files: Vec<UploadDescriptor>) -> Self {
        Self {
            files,
            dir: String::new(),
            name_prefix: config.name_prefix.clone(),
            mimetype: config.mimetype.clone(),
            file_extension: config.file_extension.clone(),
            user_id: None,
            recursive: config.recursive,
            overwrite: config.overwrite,
            static_dir: config.static_dir.clone(),
        }
    }

    /// Set the default subdirectory.
    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set the name prefix.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Set the default MIME type.
    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = mimetype.into();
        self
    }

    /// Set the default extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = Some(extension.into());
        self
    }

    /// Set the default creating user.
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set whether parent directories are created.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set whether registered paths may be overwritten.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the default static directory key.
    pub fn with_static_dir(mut self, static_dir: impl Into<String>) -> Self {
        self.static_dir = static_dir.into();
        self
    }
}

/// Why a file was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An active record already holds the path and overwrite is off.
    PathTaken,
    /// The descriptor carried no data; only the record was upserted.
    NoData,
}

/// Outcome for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// Written to disk and recorded.
    Saved,
    /// Not written.
    Skipped(SkipReason),
    /// An error occurred; nothing is left on disk.
    Failed(String),
}

/// A processed descriptor.
#[derive(Debug, Clone)]
pub struct SavedFile {
    /// Static directory key.
    pub static_dir: String,
    /// Subdirectory.
    pub dir: String,
    /// File name.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// MIME type.
    pub mimetype: String,
    /// Bytes that were (or would have been) written.
    pub buffer: Vec<u8>,
    /// Recorded size.
    pub size: u64,
    /// Creating user.
    pub user_id: Option<i64>,
    /// Record written for this file.
    pub record: Option<FileRecord>,
    /// Outcome.
    pub status: SaveStatus,
}

impl SavedFile {
    /// Whether the data was written.
    pub fn saved(&self) -> bool {
        self.status == SaveStatus::Saved
    }
}

/// Content staged next to its destination. The staging file is removed
/// unless it is moved into place.
struct StagedFile {
    path: Option<PathBuf>,
}

impl StagedFile {
    async fn write(dest: &Path, data: &[u8]) -> Result<Self> {
        let path = staging_path(dest);
        let staged = Self {
            path: Some(path.clone()),
        };
        tokio::fs::write(&path, data).await?;
        Ok(staged)
    }

    async fn persist(mut self, dest: &Path) -> Result<()> {
        if let Some(ref path) = self.path {
            tokio::fs::rename(path, dest).await?;
        }
        self.path = None;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(ref path) = self.path {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed staged file {:?}", path),
                Err(e) => warn!("Failed to remove staged file {:?}: {}", path, e),
            }
        }
    }
}

/// Saves buffers to disk and records them.
#[derive(Debug, Clone)]
pub struct FileSaver {
    db: Database,
    dirs: StaticDirectories,
    naming: NamingPolicy,
    write_gate: Arc<Mutex<()>>,
}

impl FileSaver {
    /// Create a saver with the system clock and RNG.
    pub fn new(db: Database, dirs: StaticDirectories) -> Self {
        Self::with_naming(db, dirs, NamingPolicy::default())
    }

    /// Create a saver with an explicit naming policy.
    pub fn with_naming(db: Database, dirs: StaticDirectories, naming: NamingPolicy) -> Self {
        Self {
            db,
            dirs,
            naming,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Static directories this saver writes under.
    pub fn directories(&self) -> &StaticDirectories {
        &self.dirs
    }

    /// Save every file in the request.
    ///
    /// Results come back in input order. Per-file problems are reported in
    /// [`SavedFile::status`]; the call itself fails only when a static
    /// directory key is unknown.
    pub async fn save(&self, request: SaveRequest) -> Result<Vec<SavedFile>> {
        let mut roots = Vec::with_capacity(request.files.len());
        for file in &request.files {
            let key = file.static_dir.as_deref().unwrap_or(&request.static_dir);
            roots.push((key.to_string(), self.dirs.resolve(key)?));
        }

        let mut results = Vec::with_capacity(request.files.len());
        for (file, (static_dir, root)) in request.files.iter().zip(roots) {
            results.push(self.save_one(&request, file, static_dir, &root).await);
        }

        let saved = results.iter().filter(|f| f.saved()).count();
        info!("Saved {} of {} file(s)", saved, results.len());
        Ok(results)
    }

    async fn save_one(
        &self,
        request: &SaveRequest,
        file: &UploadDescriptor,
        static_dir: String,
        root: &Path,
    ) -> SavedFile {
        let dir = file.dir.clone().unwrap_or_else(|| request.dir.clone());
        let mimetype = file
            .mimetype
            .clone()
            .unwrap_or_else(|| request.mimetype.clone());
        let name = file.name.clone().unwrap_or_else(|| {
            let extension = file
                .file_extension
                .as_deref()
                .or(request.file_extension.as_deref())
                .map(normalize_extension)
                .filter(|ext| !ext.is_empty())
                .unwrap_or_else(|| mime_subtype(&mimetype));
            self.naming
                .compose(&request.name_prefix, SAVE_RANDOM_DIGITS, None, extension)
        });
        let path = file
            .path
            .clone()
            .unwrap_or_else(|| root.join(&dir).join(&name));
        let buffer = file.data.clone().unwrap_or_default();
        let size = file.size.unwrap_or(buffer.len() as u64);
        let user_id = file.user_id.or(request.user_id);

        let mut saved = SavedFile {
            static_dir,
            dir,
            name,
            path,
            mimetype,
            buffer,
            size,
            user_id,
            record: None,
            status: SaveStatus::Failed(String::new()),
        };

        let result = if file.path.is_none()
            && !(is_contained(Path::new(&saved.dir)) && is_contained(Path::new(&saved.name)))
        {
            Err(StowageError::Config(format!(
                "file path escapes static directory: {}",
                saved.path.display()
            )))
        } else {
            self.write_and_record(request, file.data.is_some(), &saved)
                .await
        };

        match result {
            Ok((status, record)) => {
                debug!("{:?} -> {:?}", saved.path, status);
                saved.status = status;
                saved.record = record;
            }
            Err(e) => {
                warn!("Failed to save {:?}: {}", saved.path, e);
                saved.status = SaveStatus::Failed(e.to_string());
            }
        }
        saved
    }

    async fn write_and_record(
        &self,
        request: &SaveRequest,
        has_data: bool,
        file: &SavedFile,
    ) -> Result<(SaveStatus, Option<FileRecord>)> {
        let path_str = file.path.to_string_lossy().into_owned();
        let repo = FileRepository::new(self.db.pool());

        let _gate = self.write_gate.lock().await;

        let existing = repo.get_active_by_path(&path_str).await?;
        if existing.is_some() && !request.overwrite {
            info!("File path is not unique, skipping: {}", path_str);
            return Ok((SaveStatus::Skipped(SkipReason::PathTaken), None));
        }

        let staged = if has_data {
            if request.recursive {
                if let Some(parent) = file.path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            Some(StagedFile::write(&file.path, &file.buffer).await?)
        } else {
            None
        };

        let size = i64::try_from(file.size).map_err(|_| {
            StowageError::Config(format!("file size out of range: {}", file.size))
        })?;

        let record = match &existing {
            Some(existing) => {
                let mut update = FileRecordUpdate::new()
                    .name(&file.name)
                    .mimetype(&file.mimetype)
                    .size(size)
                    .deleted(false);
                if let Some(user_id) = file.user_id {
                    update = update.updated_by(user_id);
                }
                repo.update(existing.file_id, &update)
                    .await?
                    .ok_or_else(|| StowageError::NotFound(format!("file {}", existing.file_id)))?
            }
            None => {
                let mut new = NewFileRecord::new(&file.name, &file.mimetype, size, &path_str);
                if let Some(user_id) = file.user_id {
                    new = new.with_user(user_id);
                }
                repo.create(&new).await?
            }
        };

        let status = match staged {
            Some(staged) => {
                if let Err(e) = staged.persist(&file.path).await {
                    revert_record(&repo, existing.as_ref(), &record).await;
                    return Err(e);
                }
                SaveStatus::Saved
            }
            None => SaveStatus::Skipped(SkipReason::NoData),
        };
        Ok((status, Some(record)))
    }
}

/// Undo a record upsert whose file could not be moved into place.
async fn revert_record(
    repo: &FileRepository<'_>,
    previous: Option<&FileRecord>,
    record: &FileRecord,
) {
    let result = match previous {
        Some(previous) => {
            let update = FileRecordUpdate::new()
                .name(&previous.name)
                .mimetype(&previous.mimetype)
                .size(previous.size);
            repo.update(previous.file_id, &update).await.map(|_| ())
        }
        None => repo.mark_deleted(record.file_id).await.map(|_| ()),
    };
    if let Err(e) = result {
        warn!("Failed to revert file record {}: {}", record.file_id, e);
    }
}
