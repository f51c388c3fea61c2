//! Packaging configuration
//!
//! Every option is spelled out on [`PackageConfig`] and a fresh value is
//! built per invocation. Values come from built-in defaults, an optional
//! TOML file and CLI flags, in that order.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Default staging directory, relative to the project root
pub const DEFAULT_STAGING_DIR: &str = "dist";

/// Default dependency install directory, relative to the staging directory
pub const DEFAULT_INSTALL_DIR: &str = "requirements";

/// Default provisioning stack name used as archive file prefix
pub const DEFAULT_STACK: &str = "stack";

/// Errors for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Options for one packaging invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    /// Resource name, used in archive file names
    pub name: String,

    /// Provisioning stack name, prefixed to archive file names
    pub stack: String,

    /// Include globs, relative to the project root
    pub include: Vec<String>,

    /// Exclude globs, relative to the project root
    pub exclude: Vec<String>,

    /// Directory holding generated archives, relative to the project root
    pub staging_dir: String,

    /// Dependency install directory, relative to the staging directory
    pub install_dir: String,

    /// Put dependencies in a separate layer archive instead of the package
    pub layer: bool,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            stack: DEFAULT_STACK.to_string(),
            include: vec!["**".to_string()],
            exclude: Vec::new(),
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
            install_dir: DEFAULT_INSTALL_DIR.to_string(),
            layer: false,
        }
    }
}

impl PackageConfig {
    /// Defaults for the named resource
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values that would place outputs outside the project root
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".to_string()));
        }
        if self.name.contains(['/', '\\']) || self.stack.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(
                "name and stack must not contain path separators".to_string(),
            ));
        }
        check_relative("staging_dir", &self.staging_dir)?;
        check_relative("install_dir", &self.install_dir)?;
        Ok(())
    }

    /// Staging directory with any trailing separator removed
    pub fn staging_dir(&self) -> &str {
        self.staging_dir.trim_end_matches('/')
    }

    /// Exclude globs plus the implicit staging directory exclusion.
    ///
    /// The configured list is left untouched.
    pub fn effective_excludes(&self) -> Vec<String> {
        let mut excludes = self.exclude.clone();
        excludes.push(format!("{}/**", self.staging_dir()));
        excludes
    }

    /// Archive file name for a role suffix, e.g. `stack-api-lambda.zip`
    pub fn archive_file_name(&self, suffix: &str) -> String {
        format!("{}-{}-{}", self.stack, self.name, suffix)
    }
}

fn check_relative(field: &str, value: &str) -> Result<(), ConfigError> {
    let path = Path::new(value);
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must not be empty")));
    }
    // `components()` drops interior `.` segments, so check the raw value
    if path.is_absolute()
        || value.split(['/', '\\']).any(|segment| segment == ".")
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(ConfigError::Invalid(format!(
            "{field} must be a relative path inside the project: {value}"
        )));
    }
    Ok(())
}
