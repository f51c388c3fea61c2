//! Fixed ignore rules applied at write time.
//!
//! Matching is done on the absolute path and `*` may cross directory
//! separators, so `*/__pycache__*` catches cache trees at any depth.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::ArchiveError;

/// Compiled bytecode, bytecode cache directories and installed package
/// metadata directories.
pub const IGNORE_PATTERNS: &[&str] = &["*.py[c|o]", "*/__pycache__*", "*.dist-info*"];

/// Compiled form of [`IGNORE_PATTERNS`]
#[derive(Debug)]
pub struct IgnoreRules {
    glob_set: GlobSet,
}

impl IgnoreRules {
    /// Compile the fixed ignore list
    pub fn new() -> Result<Self, ArchiveError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in IGNORE_PATTERNS {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            glob_set: builder.build()?,
        })
    }

    /// Check if a path should be left out of an archive
    pub fn is_ignored(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        if std::path::MAIN_SEPARATOR != '/' {
            let normalized = path_str.replace(std::path::MAIN_SEPARATOR, "/");
            return self.glob_set.is_match(normalized.as_str());
        }
        self.glob_set.is_match(path_str.as_ref())
    }
}
