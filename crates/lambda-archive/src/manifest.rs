//! Canonical archive manifest and content hash
//!
//! Records every file entry of an archive with its content digest and
//! permission class. The content hash is computed over this manifest rather
//! than the zip container bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use crate::{io_at, ArchiveError};

/// Permission class of an entry; all other mode bits are discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionClass {
    Executable,
    Regular,
}

impl PermissionClass {
    /// Unix permission bits stored for this class
    pub fn mode(self) -> u32 {
        match self {
            PermissionClass::Executable => 0o555,
            PermissionClass::Regular => 0o444,
        }
    }

    /// Classify raw unix mode bits
    pub fn from_mode(mode: u32) -> Self {
        if mode & 0o111 != 0 {
            PermissionClass::Executable
        } else {
            PermissionClass::Regular
        }
    }

    /// Classify a file on disk by whether the current process may execute it
    #[cfg(unix)]
    pub fn of_file(path: &Path) -> Self {
        use nix::unistd::{access, AccessFlags};
        match access(path, AccessFlags::X_OK) {
            Ok(()) => PermissionClass::Executable,
            Err(_) => PermissionClass::Regular,
        }
    }

    #[cfg(not(unix))]
    pub fn of_file(_path: &Path) -> Self {
        PermissionClass::Regular
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionClass::Executable => "executable",
            PermissionClass::Regular => "regular",
        }
    }
}

/// A single file entry in an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Entry name within the archive
    pub path: String,

    /// Uncompressed size in bytes
    pub size: u64,

    /// SHA-256 hash of the entry contents
    pub sha256: String,

    pub permission: PermissionClass,
}

impl ManifestEntry {
    pub fn new(path: String, contents: &[u8], permission: PermissionClass) -> Self {
        Self {
            path,
            size: contents.len() as u64,
            sha256: hex::encode(Sha256::digest(contents)),
            permission,
        }
    }
}

/// Opaque change-detection token for an archive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered list of file entries, in archive order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    entries: Vec<ManifestEntry>,
}

impl ArchiveManifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Read the manifest of an existing zip archive.
    ///
    /// Directory entries are skipped; entries without unix mode bits are
    /// treated as regular files.
    pub fn from_archive(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path).map_err(io_at(path))?;
        let mut archive = ZipArchive::new(file)?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let permission = entry
                .unix_mode()
                .map(PermissionClass::from_mode)
                .unwrap_or(PermissionClass::Regular);
            let name = entry.name().to_string();

            // The size field comes from the archive and is not trusted
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).map_err(io_at(path))?;
            entries.push(ManifestEntry::new(name, &contents, permission));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get total uncompressed size of all entries
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Find an entry by name
    pub fn find_entry(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Canonical text form: one `<class> <sha256> <name>` line per entry
    pub fn canonical(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} {} {}\n", e.permission.as_str(), e.sha256, e.path))
            .collect()
    }

    /// SHA-256 of the canonical form, base64 encoded
    pub fn content_hash(&self) -> ContentHash {
        let digest = Sha256::digest(self.canonical().as_bytes());
        ContentHash(STANDARD.encode(digest))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
