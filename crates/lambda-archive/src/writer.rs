//! Deterministic zip writer
//!
//! Entries are written in sorted path order with a fixed timestamp and a
//! permission of either `0o555` or `0o444`, so the archive bytes depend only
//! on file contents, names and the execute bit.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info, trace};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::ignore::IgnoreRules;
use crate::manifest::{ArchiveManifest, ManifestEntry, PermissionClass};
use crate::select::FileSelection;
use crate::{io_at, relative_name, ArchiveError};

/// Timestamp stored on every entry: 2020-01-01 00:00:00
pub const FIXED_TIMESTAMP: (u16, u8, u8, u8, u8, u8) = (2020, 1, 1, 0, 0, 0);

/// How the target archive is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Create the archive, truncating any existing file
    #[default]
    Create,
    /// Add entries to an archive that must already exist
    Append,
}

fn fixed_timestamp() -> Result<DateTime, ArchiveError> {
    let (year, month, day, hour, minute, second) = FIXED_TIMESTAMP;
    DateTime::from_date_and_time(year, month, day, hour, minute, second)
        .map_err(|_| ArchiveError::InvalidTimestamp)
}

fn open_writer(path: &Path, mode: WriteMode) -> Result<ZipWriter<File>, ArchiveError> {
    match mode {
        WriteMode::Create => {
            let file = File::create(path).map_err(io_at(path))?;
            Ok(ZipWriter::new(file))
        }
        WriteMode::Append => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|source| match source.kind() {
                    io::ErrorKind::NotFound => ArchiveError::AppendTargetMissing(path.to_path_buf()),
                    _ => ArchiveError::Io {
                        path: path.to_path_buf(),
                        source,
                    },
                })?;
            Ok(ZipWriter::new_append(file)?)
        }
    }
}

/// Write the files of `selection` into the archive at `path`.
///
/// Entry names are relative to `base_dir`. Paths matching the fixed ignore
/// rules and anything that is not a regular file are skipped silently.
/// Returns the manifest of the entries written by this call.
pub fn write_archive(
    path: &Path,
    selection: &FileSelection,
    mode: WriteMode,
    base_dir: &Path,
) -> Result<ArchiveManifest, ArchiveError> {
    let ignore = IgnoreRules::new()?;
    let timestamp = fixed_timestamp()?;
    let mut zip = open_writer(path, mode)?;
    let mut entries = Vec::new();

    for file in selection.sorted() {
        if ignore.is_ignored(file) {
            trace!(path = %file.display(), "ignored");
            continue;
        }

        let metadata = fs::metadata(file).map_err(io_at(file))?;
        if !metadata.is_file() {
            continue;
        }

        let name = relative_name(file, base_dir)?;
        let permission = PermissionClass::of_file(file);
        let contents = fs::read(file).map_err(io_at(file))?;

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(timestamp)
            .unix_permissions(permission.mode());
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&contents).map_err(io_at(path))?;

        debug!(entry = %name, size = contents.len(), permission = permission.as_str(), "added");
        entries.push(ManifestEntry::new(name, &contents, permission));
    }

    zip.finish()?;

    let manifest = ArchiveManifest::new(entries);
    info!(
        archive = %path.display(),
        mode = ?mode,
        entries = manifest.len(),
        bytes = manifest.total_size(),
        "wrote archive"
    );
    Ok(manifest)
}
