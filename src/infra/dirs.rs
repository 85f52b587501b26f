//! Platform-specific directory management
//!
//! Provides platform-specific paths for the cache and config directories.
//! Follows XDG Base Directory Specification on Linux and standard locations on macOS.
//!
//! Environment variables can override default directories:
//! - `RVFORGE_CACHE_DIR` - Override cache directory
//! - `RVFORGE_CONFIG_DIR` - Override config directory

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CACHE_DIR: &str = "RVFORGE_CACHE_DIR";
pub const ENV_CONFIG_DIR: &str = "RVFORGE_CONFIG_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "rvforge";

/// Subdirectory holding shared source checkouts
const SOURCES_SUBDIR: &str = "sources";

/// Platform-specific directory provider for rvforge
#[derive(Debug, Clone)]
pub struct RvforgeDirs {
    cache_dir: PathBuf,
    config_dir: PathBuf,
}

impl RvforgeDirs {
    /// Create a new `RvforgeDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve(ENV_CACHE_DIR, dirs::cache_dir, ".cache"),
            config_dir: Self::resolve(ENV_CONFIG_DIR, dirs::config_dir, ".config"),
        }
    }

    /// Get the cache directory path
    ///
    /// - Linux: `$XDG_CACHE_HOME/rvforge` or `~/.cache/rvforge`
    /// - macOS: `~/Library/Caches/rvforge`
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Get the config directory path
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Default root of the shared source cache
    ///
    /// Checkouts here are keyed by component name and reused across targets
    /// and ISA widths.
    #[must_use]
    pub fn sources_dir(&self) -> PathBuf {
        self.cache_dir.join(SOURCES_SUBDIR)
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    fn resolve(var: &str, platform: fn() -> Option<PathBuf>, home_fallback: &str) -> PathBuf {
        if let Ok(path) = env::var(var) {
            return PathBuf::from(path);
        }

        platform().map(|p| p.join(APP_NAME)).unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(home_fallback).join(APP_NAME))
                .unwrap_or_else(|| PathBuf::from(".").join(home_fallback).join(APP_NAME))
        })
    }
}

impl Default for RvforgeDirs {
    fn default() -> Self {
        Self::new()
    }
}
