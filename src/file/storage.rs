//! Upload storage backend.
//!
//! An [`UploadStorage`] is configured once per form field. The destination
//! directory `{uploads_root}/{directory}` is created when the storage is
//! built, and every incoming file is named by the [`NamingPolicy`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::naming::{NameParams, NamingPolicy, DEFAULT_RANDOM_DIGITS};
use super::is_contained;
use crate::{Result, StowageError};

/// Naming and placement parameters for an upload field.
#[derive(Debug, Clone)]
pub struct StorageParams {
    /// Name prefix. Defaults to the field name.
    pub prefix: Option<String>,
    /// Fixed timestamp segment.
    pub date: Option<String>,
    /// Fixed file name, used verbatim.
    pub filename: Option<String>,
    /// Number of random digits in generated names.
    pub randoms: u32,
    /// Explicit extension.
    pub suffix: Option<String>,
    /// Subdirectory under the uploads root.
    pub directory: Option<String>,
}

impl Default for StorageParams {
    fn default() -> Self {
        Self {
            prefix: None,
            date: None,
            filename: None,
            randoms: DEFAULT_RANDOM_DIGITS,
            suffix: None,
            directory: None,
        }
    }
}

impl StorageParams {
    /// Create default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set a fixed timestamp segment.
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Set a fixed file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the number of random digits.
    pub fn with_randoms(mut self, randoms: u32) -> Self {
        self.randoms = randoms;
        self
    }

    /// Set the extension.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Set the subdirectory.
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

/// A file written by an [`UploadStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Form field the file arrived on.
    pub field_name: String,
    /// Client-supplied file name.
    pub original_name: Option<String>,
    /// Reported MIME type.
    pub mimetype: String,
    /// Generated file name.
    pub name: String,
    /// Full path on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Destination directory plus naming for one upload field.
#[derive(Debug, Clone)]
pub struct UploadStorage {
    destination: PathBuf,
    params: StorageParams,
    naming: NamingPolicy,
}

impl UploadStorage {
    /// Create a storage with the system clock and RNG.
    ///
    /// The destination directory is created if it doesn't exist.
    pub fn new(uploads_root: impl AsRef<Path>, params: StorageParams) -> Result<Self> {
        Self::with_naming(uploads_root, params, NamingPolicy::default())
    }

    /// Create a storage with an explicit naming policy.
    pub fn with_naming(
        uploads_root: impl AsRef<Path>,
        params: StorageParams,
        naming: NamingPolicy,
    ) -> Result<Self> {
        let mut destination = uploads_root.as_ref().to_path_buf();

        if let Some(ref directory) = params.directory {
            if !is_contained(Path::new(directory)) {
                return Err(StowageError::Config(format!(
                    "upload directory must be relative to the uploads root: {directory}"
                )));
            }
            destination.push(directory);
        }

        if let Some(ref filename) = params.filename {
            if !is_plain_name(filename) {
                return Err(StowageError::Config(format!(
                    "upload file name must not contain path separators: {filename}"
                )));
            }
        }

        fs::create_dir_all(&destination)?;
        debug!("Upload destination ready at {:?}", destination);

        Ok(Self {
            destination,
            params,
            naming,
        })
    }

    /// Directory files are written to.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Parameters this storage was configured with.
    pub fn params(&self) -> &StorageParams {
        &self.params
    }

    /// File name for a file arriving on `field` with `mimetype`.
    pub fn filename_for(&self, field: &str, mimetype: &str) -> String {
        let params = NameParams {
            prefix: self.params.prefix.as_deref().unwrap_or(field),
            filename: self.params.filename.as_deref(),
            date: self.params.date.as_deref(),
            randoms: self.params.randoms,
            suffix: self.params.suffix.as_deref(),
            mimetype,
        };
        self.naming.file_name(&params)
    }

    /// Write `data` to a freshly named file in the destination directory.
    ///
    /// An existing file at the generated path is never replaced; the
    /// collision is reported as [`StowageError::RepeatedQuery`].
    pub async fn store(
        &self,
        field: &str,
        original_name: Option<&str>,
        mimetype: &str,
        data: &[u8],
    ) -> Result<StoredUpload> {
        let name = self.filename_for(field, mimetype);
        let path = self.destination.join(&name);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StowageError::RepeatedQuery(path.to_string_lossy().into_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove partial upload {:?}: {}", path, remove_err);
            }
            return Err(e.into());
        }
        debug!("Stored upload for field {} at {:?}", field, path);

        Ok(StoredUpload {
            field_name: field.to_string(),
            original_name: original_name.map(str::to_string),
            mimetype: mimetype.to_string(),
            name,
            path,
            size: data.len() as u64,
        })
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}
