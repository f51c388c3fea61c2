//! Package orchestration
//!
//! Decides whether installed dependencies are merged into the package
//! archive or written to a separate layer archive, drives the archive
//! builder and hashes the results. One invocation moves through
//! [`BuildStage`]s in order; any failure aborts it and is reported with the
//! stage it was trying to reach.

use lambda_archive::{
    append_files, build_archive, select_all, write_archive, ArchiveError, ArchiveManifest,
    ContentHash, WriteMode,
};
use serde::Serialize;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{ConfigError, PackageConfig};

/// Role of an archive produced by the packager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveRole {
    /// Application code, possibly with dependencies merged in
    Package,
    /// Dependencies only
    Layer,
}

impl ArchiveRole {
    pub fn suffix(self) -> &'static str {
        match self {
            ArchiveRole::Package => "lambda.zip",
            ArchiveRole::Layer => "requirements.zip",
        }
    }
}

/// Stages of one packaging invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Init,
    Staged,
    PrimaryWritten,
    DependenciesMerged,
    LayerWritten,
    Hashed,
    Done,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Init => "init",
            BuildStage::Staged => "staged",
            BuildStage::PrimaryWritten => "primary_written",
            BuildStage::DependenciesMerged => "dependencies_merged",
            BuildStage::LayerWritten => "layer_written",
            BuildStage::Hashed => "hashed",
            BuildStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Errors for packaging operations
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("project root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("failed to create staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("packaging failed before reaching {stage}: {source}")]
    Archive {
        stage: BuildStage,
        #[source]
        source: ArchiveError,
    },
}

impl PackageError {
    fn at(stage: BuildStage) -> impl FnOnce(ArchiveError) -> PackageError {
        move |source| PackageError::Archive { stage, source }
    }
}

/// Values handed to the provisioning layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageOutputs {
    pub package_archive: PathBuf,
    pub package_hash: ContentHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_archive: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_hash: Option<ContentHash>,
}

/// Content hash of an archive on disk, computed from its canonical manifest
pub fn compute_hash(archive: &Path) -> Result<ContentHash, ArchiveError> {
    Ok(ArchiveManifest::from_archive(archive)?.content_hash())
}

/// Packager for one project root, created in the staged state
#[derive(Debug)]
pub struct Packager {
    root: PathBuf,
    config: PackageConfig,
    staging_path: PathBuf,
    install_path: PathBuf,
}

impl Packager {
    /// Validate the configuration and create the staging and dependency
    /// install directories if they are missing.
    pub fn stage(root: impl Into<PathBuf>, config: PackageConfig) -> Result<Self, PackageError> {
        config.validate()?;

        let mut root = root.into();
        if root.is_relative() {
            let cwd = env::current_dir().map_err(|source| PackageError::Staging {
                path: root.clone(),
                source,
            })?;
            root = cwd.join(root);
        }
        if !root.is_dir() {
            return Err(PackageError::RootNotFound(root));
        }

        let staging_path = root.join(config.staging_dir());
        let install_path = staging_path.join(&config.install_dir);
        fs::create_dir_all(&install_path).map_err(|source| PackageError::Staging {
            path: install_path.clone(),
            source,
        })?;

        debug!(
            root = %root.display(),
            staging = %staging_path.display(),
            stage = %BuildStage::Staged,
            "staged"
        );
        Ok(Self {
            root,
            config,
            staging_path,
            install_path,
        })
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    /// Directory dependencies are expected to be installed into
    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn archive_path(&self, role: ArchiveRole) -> PathBuf {
        self.staging_path
            .join(self.config.archive_file_name(role.suffix()))
    }

    /// Write the package archive from the project's code files, then merge
    /// the installed dependencies into it when `include_dependencies` is set.
    pub fn build_package(&self, include_dependencies: bool) -> Result<PathBuf, PackageError> {
        let path = self.archive_path(ArchiveRole::Package);

        build_archive(
            &path,
            &self.root,
            &self.config.include,
            &self.config.effective_excludes(),
        )
        .map_err(PackageError::at(BuildStage::PrimaryWritten))?;
        info!(archive = %path.display(), stage = %BuildStage::PrimaryWritten, "package written");

        if include_dependencies {
            let dependencies = select_all(&self.install_path)
                .map_err(PackageError::at(BuildStage::DependenciesMerged))?;
            append_files(&path, &dependencies, &self.install_path)
                .map_err(PackageError::at(BuildStage::DependenciesMerged))?;
            info!(
                archive = %path.display(),
                stage = %BuildStage::DependenciesMerged,
                "dependencies merged"
            );
        }

        Ok(path)
    }

    /// Write the installed dependencies into a separate layer archive.
    pub fn build_dependency_archive(&self) -> Result<PathBuf, PackageError> {
        let path = self.archive_path(ArchiveRole::Layer);

        let dependencies = select_all(&self.install_path)
            .map_err(PackageError::at(BuildStage::LayerWritten))?;
        write_archive(&path, &dependencies, WriteMode::Create, &self.install_path)
            .map_err(PackageError::at(BuildStage::LayerWritten))?;
        info!(archive = %path.display(), stage = %BuildStage::LayerWritten, "layer written");

        Ok(path)
    }

    /// Run a whole invocation: write the package (and the layer when
    /// configured) and hash every archive produced.
    pub fn run(&self) -> Result<PackageOutputs, PackageError> {
        let (package_archive, layer_archive) = if self.config.layer {
            let package = self.build_package(false)?;
            (package, Some(self.build_dependency_archive()?))
        } else {
            (self.build_package(true)?, None)
        };

        let package_hash =
            compute_hash(&package_archive).map_err(PackageError::at(BuildStage::Hashed))?;
        let layer_hash = layer_archive
            .as_deref()
            .map(compute_hash)
            .transpose()
            .map_err(PackageError::at(BuildStage::Hashed))?;

        info!(
            name = %self.config.name,
            package_hash = %package_hash,
            layer = layer_archive.is_some(),
            stage = %BuildStage::Done,
            "packaging complete"
        );
        Ok(PackageOutputs {
            package_archive,
            package_hash,
            layer_archive,
            layer_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_project() -> TempDir {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("handler.py"), "def handler(e, c):\n    return e\n").unwrap();
        fs::write(dir.path().join("requirements.txt"), "six\n").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/util.py"), "X = 1\n").unwrap();

        dir
    }

    fn install_dependency(packager: &Packager) {
        let install = packager.install_path();
        fs::write(install.join("six.py"), "SIX = 1\n").unwrap();
        fs::create_dir_all(install.join("six-1.16.0.dist-info")).unwrap();
        fs::write(install.join("six-1.16.0.dist-info/RECORD"), "six.py").unwrap();
    }

    fn names(path: &Path) -> Vec<String> {
        ArchiveManifest::from_archive(path)
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.path.clone())
            .collect()
    }

    #[test]
    fn test_stage_creates_install_dir() {
        let dir = create_project();
        let packager = Packager::stage(dir.path(), PackageConfig::new("api")).unwrap();

        assert!(dir.path().join("dist/requirements").is_dir());
        assert_eq!(packager.install_path(), dir.path().join("dist/requirements"));

        // Staging again is a no-op
        assert!(Packager::stage(dir.path(), PackageConfig::new("api")).is_ok());
    }

    #[test]
    fn test_stage_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = Packager::stage(dir.path().join("missing"), PackageConfig::new("api")).unwrap_err();
        assert!(matches!(err, PackageError::RootNotFound(_)));
    }

    #[test]
    fn test_stage_rejects_invalid_config() {
        let dir = create_project();
        let err = Packager::stage(dir.path(), PackageConfig::default()).unwrap_err();
        assert!(matches!(err, PackageError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_archive_paths() {
        let dir = create_project();
        let packager = Packager::stage(dir.path(), PackageConfig::new("api")).unwrap();

        assert_eq!(
            packager.archive_path(ArchiveRole::Package),
            dir.path().join("dist/stack-api-lambda.zip")
        );
        assert_eq!(
            packager.archive_path(ArchiveRole::Layer),
            dir.path().join("dist/stack-api-requirements.zip")
        );
    }

    #[test]
    fn test_build_package_merges_dependencies() {
        let dir = create_project();
        let packager = Packager::stage(dir.path(), PackageConfig::new("api")).unwrap();
        install_dependency(&packager);

        let path = packager.build_package(true).unwrap();

        assert_eq!(
            names(&path),
            vec!["handler.py", "lib/util.py", "requirements.txt", "six.py"]
        );
    }

    #[test]
    fn test_build_package_without_dependencies() {
        let dir = create_project();
        let packager = Packager::stage(dir.path(), PackageConfig::new("api")).unwrap();
        install_dependency(&packager);

        let path = packager.build_package(false).unwrap();

        assert_eq!(names(&path), vec!["handler.py", "lib/util.py", "requirements.txt"]);
    }

    #[test]
    fn test_rebuild_never_includes_previous_archive() {
        let dir = create_project();
        let packager = Packager::stage(dir.path(), PackageConfig::new("api")).unwrap();

        let first = packager.build_package(false).unwrap();
        let first_hash = compute_hash(&first).unwrap();
        let second = packager.build_package(false).unwrap();

        assert!(!names(&second).iter().any(|n| n.starts_with("dist/")));
        assert_eq!(compute_hash(&second).unwrap(), first_hash);
    }

    #[test]
    fn test_dependency_archive() {
        let dir = create_project();
        let packager = Packager::stage(dir.path(), PackageConfig::new("api")).unwrap();
        install_dependency(&packager);

        let path = packager.build_dependency_archive().unwrap();

        assert_eq!(path, dir.path().join("dist/stack-api-requirements.zip"));
        assert_eq!(names(&path), vec!["six.py"]);
    }

    #[test]
    fn test_run_with_layer() {
        let dir = create_project();
        let mut config = PackageConfig::new("api");
        config.layer = true;
        let packager = Packager::stage(dir.path(), config).unwrap();
        install_dependency(&packager);

        let outputs = packager.run().unwrap();

        assert!(outputs.layer_archive.is_some());
        assert_ne!(Some(&outputs.package_hash), outputs.layer_hash.as_ref());
        assert!(!names(&outputs.package_archive).contains(&"six.py".to_string()));
    }

    #[test]
    fn test_run_without_layer() {
        let dir = create_project();
        let packager = Packager::stage(dir.path(), PackageConfig::new("api")).unwrap();

        let outputs = packager.run().unwrap();

        assert!(outputs.layer_archive.is_none());
        assert!(outputs.layer_hash.is_none());
        assert!(!dir.path().join("dist/stack-api-requirements.zip").exists());
    }

    #[test]
    fn test_outputs_json_shape() {
        let dir = create_project();
        let packager = Packager::stage(dir.path(), PackageConfig::new("api")).unwrap();
        let outputs = packager.run().unwrap();

        let json = serde_json::to_value(&outputs).unwrap();
        assert!(json["package_hash"].is_string());
        assert!(json.get("layer_archive").is_none());
    }
}
