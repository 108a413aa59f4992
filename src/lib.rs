//! stowage - upload intake and file persistence
//!
//! Validates multipart uploads, writes files below named static
//! directories, keeps file records with soft delete in SQLite and zips
//! directory trees.

pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod web;

pub use config::Config;
pub use db::{Database, NewUser, User, UserRepository};
pub use error::{Result, StatusKind, StowageError, UploadRejection};
pub use file::{
    presets, zip_directory, ArchiveSummary, FileRecord, FileRecordUpdate, FileRef, FileRemover,
    FileRepository, FileSaver, IncomingFile, MimeFilter, NamingPolicy, NewFileRecord,
    RequestUploads, SaveRequest, SaveStatus, SavedFile, SkipReason, StaticDirectories,
    StorageParams, StoreRegistrar, StoredUpload, UploadDescriptor, UploadRegistrar, UploadRule,
    UploadRuleBuilder, UploadStorage,
};
