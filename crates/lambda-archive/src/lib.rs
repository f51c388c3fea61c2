//! Deterministic zip archive builder.
//!
//! Resolves which files under a root belong in an archive using include and
//! exclude globs, then writes them into a deflate-compressed zip with
//! normalized per-entry metadata (fixed timestamp, two permission classes)
//! so identical inputs always produce identical archives. The canonical
//! manifest of an archive yields a stable content hash.

mod ignore;
mod manifest;
mod select;
mod writer;

pub use ignore::{IgnoreRules, IGNORE_PATTERNS};
pub use manifest::{ArchiveManifest, ContentHash, ManifestEntry, PermissionClass};
pub use select::{resolve_selection, select_all, FileSelection, CATCH_ALL};
pub use writer::{write_archive, WriteMode, FIXED_TIMESTAMP};

use std::io;
use std::path::{Path, PathBuf};

/// Errors for archive building
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Glob pattern error: {0}")]
    Pattern(#[from] globset::Error),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Cannot append to missing archive: {0}")]
    AppendTargetMissing(PathBuf),

    #[error("Path {path} is not within base directory {base}")]
    PathNotInBase { path: PathBuf, base: PathBuf },

    #[error("Invalid entry timestamp")]
    InvalidTimestamp,
}

pub(crate) fn io_at(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Entry name of `path` relative to `base`, always `/`-separated.
pub(crate) fn relative_name(path: &Path, base: &Path) -> Result<String, ArchiveError> {
    let rel = path
        .strip_prefix(base)
        .map_err(|_| ArchiveError::PathNotInBase {
            path: path.to_path_buf(),
            base: base.to_path_buf(),
        })?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Ok(parts.join("/"))
}

/// Select files under `root` and write them into a fresh archive at `path`.
///
/// Entry names are relative to `root`.
pub fn build_archive<S: AsRef<str>>(
    path: &Path,
    root: &Path,
    includes: &[S],
    excludes: &[S],
) -> Result<ArchiveManifest, ArchiveError> {
    let selection = resolve_selection(root, includes, excludes)?;
    write_archive(path, &selection, WriteMode::Create, root)
}

/// Add `selection` to an existing archive at `path`.
pub fn append_files(
    path: &Path,
    selection: &FileSelection,
    base_dir: &Path,
) -> Result<ArchiveManifest, ArchiveError> {
    write_archive(path, selection, WriteMode::Append, base_dir)
}
