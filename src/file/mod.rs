//! File handling for stowage.
//!
//! This module provides:
//! - File naming from a prefix, random digits, a timestamp and an extension
//! - Per-field upload storage and validation
//! - Saving byte buffers under named static directories
//! - Removal with soft-delete of the file record
//! - Zip archiving of directory trees

mod archive;
mod metadata;
mod naming;
mod remove;
mod save;
mod storage;
mod validator;

use std::path::{Component, Path, PathBuf};

pub use archive::{zip_directory, ArchiveSummary};
pub use metadata::{FileRecord, FileRecordUpdate, FileRepository, NewFileRecord};
pub use naming::{
    extension_for_mime, mime_subtype, resolve_extension, timestamp_token, Clock, FixedClock,
    NameParams, NamingPolicy, RandomSource, SequenceRandom, SystemClock, ThreadRandom,
    DEFAULT_RANDOM_DIGITS,
};
pub use remove::{remove_request_uploads, FileRef, FileRemover};
pub use save::{
    FileSaver, SaveRequest, SaveStatus, SavedFile, SkipReason, StaticDirectories,
    UploadDescriptor,
};
pub use storage::{StorageParams, StoredUpload, UploadStorage};
pub use validator::{
    presets, IncomingFile, MimeFilter, RequestUploads, StoreRegistrar, UploadRegistrar,
    UploadRule, UploadRuleBuilder, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE,
};

/// Check that a relative path stays below the directory it is joined to.
pub(crate) fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Sibling path that content for `path` is written to before being
/// renamed into place.
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_contained() {
        assert!(is_contained(Path::new("a/b/c")));
        assert!(is_contained(Path::new("./a")));
        assert!(is_contained(Path::new("")));
        assert!(!is_contained(Path::new("../a")));
        assert!(!is_contained(Path::new("a/../../b")));
        assert!(!is_contained(Path::new("/etc")));
    }

    #[test]
    fn test_staging_path_is_sibling() {
        assert_eq!(
            staging_path(Path::new("out/a.txt")),
            Path::new("out/.a.txt.partial")
        );
    }
}
