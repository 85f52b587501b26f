//! Settings file
//!
//! Reads optional overrides from `config.toml` in the config directory:
//! default job count, cache/template/target directories, and per-component
//! source pins.
//!
//! ```toml
//! [build]
//! jobs = 8
//!
//! [paths]
//! sources = "/srv/rvforge/sources"
//!
//! [sources.linux]
//! url = "https://github.com/torvalds/linux.git"
//! ref = "v6.7"
//! ```
//!
//! Command-line flags and environment variables take precedence over
//! anything read here.

use crate::infra::dirs::RvforgeDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings error types
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Settings loaded from the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Default build options
    #[serde(default)]
    pub build: BuildSettings,

    /// Directory overrides
    #[serde(default)]
    pub paths: PathSettings,

    /// Per-component source overrides, keyed by component name
    #[serde(default)]
    pub sources: BTreeMap<String, SourcePin>,
}

/// Default build options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSettings {
    /// Default number of parallel jobs
    pub jobs: Option<usize>,
}

/// Directory overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    /// Shared source cache root
    pub sources: Option<PathBuf>,
    /// Directory with rootfs template overrides
    pub templates: Option<PathBuf>,
    /// Directory with manifest targets
    pub targets: Option<PathBuf>,
}

/// Override of a component's upstream location or ref
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcePin {
    /// Alternative remote URL
    pub url: Option<String>,
    /// Alternative tag or branch
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
}

impl Settings {
    /// Load settings from the config directory
    ///
    /// A missing file yields the defaults.
    pub fn load(dirs: &RvforgeDirs) -> Result<Self, SettingsError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Remote URL for a component, honoring any pin
    pub fn source_url<'a>(&'a self, component: &str, default: &'a str) -> &'a str {
        self.sources
            .get(component)
            .and_then(|pin| pin.url.as_deref())
            .unwrap_or(default)
    }

    /// Git ref for a component, honoring any pin
    pub fn source_ref<'a>(&'a self, component: &str, default: Option<&'a str>) -> Option<&'a str> {
        self.sources
            .get(component)
            .and_then(|pin| pin.git_ref.as_deref())
            .or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from_path(&temp.path().join("config.toml")).unwrap();
        assert!(settings.build.jobs.is_none());
        assert!(settings.sources.is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[build]
jobs = 3

[paths]
sources = "/srv/sources"
templates = "/srv/templates"

[sources.linux]
ref = "v6.7"

[sources.busybox]
url = "https://mirror.example/busybox.git"
"#,
        )
        .unwrap();

        let settings = Settings::load_from_path(&path).unwrap();
        assert_eq!(settings.build.jobs, Some(3));
        assert_eq!(settings.paths.sources, Some(PathBuf::from("/srv/sources")));
        assert_eq!(settings.source_ref("linux", Some("v6.6")), Some("v6.7"));
        assert_eq!(
            settings.source_url("linux", "https://default/linux.git"),
            "https://default/linux.git"
        );
        assert_eq!(
            settings.source_url("busybox", "https://default/busybox.git"),
            "https://mirror.example/busybox.git"
        );
        assert_eq!(settings.source_ref("busybox", Some("1_36_1")), Some("1_36_1"));
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[build\njobs = ").unwrap();

        let err = Settings::load_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::ParseError { .. }));
    }
}
