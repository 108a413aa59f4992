//! Zip archiving of directory trees.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::staging_path;
use crate::{Result, StowageError};

/// Counts for a finished archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Files written.
    pub files: usize,
    /// Directory entries written.
    pub directories: usize,
    /// Entries that vanished while walking.
    pub skipped: usize,
}

/// Zip the contents of `source` into `target`.
///
/// Entries are nested under `subdir` when given, otherwise they sit at the
/// archive root. Files that disappear during the walk are logged and
/// skipped; any other error aborts and removes the partial archive. The
/// archive is built next to `target` and renamed into place once it is
/// finished and flushed to disk, so a failed run leaves `target` untouched.
pub async fn zip_directory(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    subdir: Option<&str>,
) -> Result<ArchiveSummary> {
    let source = source.as_ref().to_path_buf();
    let target = target.as_ref().to_path_buf();
    let subdir = subdir
        .map(|s| s.trim_matches('/').to_string())
        .filter(|s| !s.is_empty());

    info!("Creating zip archive {:?} from {:?}", target, source);

    tokio::task::spawn_blocking(move || {
        if !source.is_dir() {
            return Err(StowageError::Archive(format!(
                "not a directory: {}",
                source.display()
            )));
        }

        let staging = staging_path(&target);
        let result = write_archive(&source, &staging, &target, subdir.as_deref())
            .and_then(|summary| {
                fs::rename(&staging, &target)?;
                Ok(summary)
            });
        if result.is_err() {
            if let Err(e) = fs::remove_file(&staging) {
                debug!("Could not remove partial archive {:?}: {}", staging, e);
            }
        }
        result
    })
    .await
    .map_err(|e| StowageError::Archive(format!("archive task failed: {e}")))?
}

fn write_archive(
    source: &Path,
    staging: &Path,
    target: &Path,
    subdir: Option<&str>,
) -> Result<ArchiveSummary> {
    let file = File::create(staging)?;
    let own_files: Vec<PathBuf> = [staging, target]
        .iter()
        .filter_map(|p| fs::canonicalize(p).ok())
        .collect();
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut summary = ArchiveSummary::default();

    let walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_not_found(e.io_error()) => {
                warn!("Skipping missing entry: {}", e);
                summary.skipped += 1;
                continue;
            }
            Err(e) => return Err(StowageError::Archive(e.to_string())),
        };

        let path = entry.path();
        let name = entry_name(source, path, subdir)?;

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
            summary.directories += 1;
            continue;
        }

        if fs::canonicalize(path).is_ok_and(|p| own_files.contains(&p)) {
            continue;
        }

        let mut input = match File::open(path) {
            Ok(input) => input,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Skipping missing file {:?}", path);
                summary.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        writer.start_file(name, options)?;
        io::copy(&mut input, &mut writer)?;
        summary.files += 1;
    }

    let output = writer.finish()?;
    let file = output
        .into_inner()
        .map_err(|e| StowageError::Io(e.into_error()))?;
    file.sync_all()?;

    info!(
        "Archive {:?} finished: {} file(s), {} directories, {} skipped",
        target, summary.files, summary.directories, summary.skipped
    );
    Ok(summary)
}

fn is_not_found(error: Option<&io::Error>) -> bool {
    error.is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

/// Archive entry name for `path`, with `/` separators.
fn entry_name(source: &Path, path: &Path, subdir: Option<&str>) -> Result<String> {
    let relative = path
        .strip_prefix(source)
        .map_err(|e| StowageError::Archive(e.to_string()))?;

    let mut parts: Vec<String> = subdir.map(str::to_string).into_iter().collect();
    parts.extend(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    Ok(parts.join("/"))
}
