//! Lambda packaging
//!
//! Packages a project directory and its installed dependencies into
//! deterministic deployment archives: a package archive and, optionally, a
//! separate dependency layer archive. Each archive gets a content hash the
//! provisioning layer uses to detect changes.

pub mod config;
pub mod package;

pub use config::{ConfigError, PackageConfig};
pub use lambda_archive::{ArchiveError, ArchiveManifest, ContentHash, PermissionClass};
pub use package::{compute_hash, ArchiveRole, BuildStage, PackageError, PackageOutputs, Packager};
