//! Configuration module for stowage.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::{Result, StowageError};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/stowage.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Multipart upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    /// Root directory that upload fields store into.
    #[serde(default = "default_uploads_root")]
    pub root: String,
    /// Default per-file size limit in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Default number of files accepted per field.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_uploads_root() -> String {
    "public/uploads".to_string()
}

fn default_max_file_size() -> u64 {
    1024 * 1024 // 1MB
}

fn default_max_files() -> usize {
    1
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root: default_uploads_root(),
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
        }
    }
}

/// A logical static directory.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StaticDirConfig {
    /// Logical key (e.g. "public").
    pub local: String,
    /// Physical directory. Defaults to `<static root>/<local>`.
    #[serde(default)]
    pub path: Option<String>,
}

impl StaticDirConfig {
    /// Create a descriptor that lives under the static root.
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            path: None,
        }
    }

    /// Point the key at an explicit physical directory.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Physical directory for this key.
    pub fn physical_path(&self, static_root: &Path) -> PathBuf {
        match self.path {
            Some(ref path) => PathBuf::from(path),
            None => static_root.join(&self.local),
        }
    }
}

/// Static directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticFilesConfig {
    /// Project root the static directories are resolved against.
    #[serde(default = "default_static_root")]
    pub root: String,
    /// Known static directories.
    #[serde(default = "default_static_dirs")]
    pub dirs: Vec<StaticDirConfig>,
}

fn default_static_root() -> String {
    ".".to_string()
}

fn default_static_dirs() -> Vec<StaticDirConfig> {
    vec![StaticDirConfig::new("public")]
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: default_static_root(),
            dirs: default_static_dirs(),
        }
    }
}

/// Call-level defaults for programmatic saves.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveConfig {
    /// Name prefix for synthesized file names.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// MIME type used when a file carries none.
    #[serde(default = "default_mimetype")]
    pub mimetype: String,
    /// Extension used when a file carries none.
    #[serde(default)]
    pub file_extension: Option<String>,
    /// Static directory key.
    #[serde(default = "default_save_static_dir")]
    pub static_dir: String,
    /// Create missing parent directories.
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    /// Overwrite files whose path is already registered.
    #[serde(default)]
    pub overwrite: bool,
}

fn default_name_prefix() -> String {
    "file".to_string()
}

fn default_mimetype() -> String {
    "text/plain".to_string()
}

fn default_save_static_dir() -> String {
    "public".to_string()
}

fn default_recursive() -> bool {
    true
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            mimetype: default_mimetype(),
            file_extension: None,
            static_dir: default_save_static_dir(),
            recursive: default_recursive(),
            overwrite: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; console only when unset.
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<String> {
    Some("logs/stowage.log".to_string())
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Upload field configuration.
    #[serde(default)]
    pub uploads: UploadsConfig,
    /// Static directories.
    #[serde(default)]
    pub static_files: StaticFilesConfig,
    /// Save defaults.
    #[serde(default)]
    pub save: SaveConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(StowageError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StowageError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `STOWAGE_DATABASE_PATH`: Override the database file
    /// - `STOWAGE_UPLOADS_ROOT`: Override the uploads root
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STOWAGE_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(root) = std::env::var("STOWAGE_UPLOADS_ROOT") {
            if !root.is_empty() {
                self.uploads.root = root;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - No static directory is configured
    /// - A static directory key is empty or repeated
    /// - `save.static_dir` does not name a configured key
    pub fn validate(&self) -> Result<()> {
        if self.static_files.dirs.is_empty() {
            return Err(StowageError::Config(
                "at least one static directory must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for dir in &self.static_files.dirs {
            if dir.local.trim().is_empty() {
                return Err(StowageError::Config(
                    "static directory key must not be empty".to_string(),
                ));
            }
            if !seen.insert(dir.local.as_str()) {
                return Err(StowageError::Config(format!(
                    "static directory key {} is configured twice",
                    dir.local
                )));
            }
        }

        if !seen.contains(self.save.static_dir.as_str()) {
            return Err(StowageError::Config(format!(
                "save.static_dir {} is not a configured static directory",
                self.save.static_dir
            )));
        }
        Ok(())
    }
}
