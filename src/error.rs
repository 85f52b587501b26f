//! Error types for rvforge
//!
//! Domain-specific error types using thiserror. [`BuildError`] carries the
//! failure taxonomy every stage reports through; its [`BuildError::exit_code`]
//! decides how the process terminates.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::settings::SettingsError;
use crate::core::target::TargetError;

/// Exit code for generic stage failures
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for usage errors, help output and unknown targets
pub const EXIT_USAGE: i32 = 2;

/// Exit code for a failed mandatory patch
pub const EXIT_FATAL_PATCH: i32 = 3;

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to copy a file or tree
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Failed to create a symbolic link
    #[error("Failed to link '{link}' -> '{target}': {error}")]
    Symlink {
        link: PathBuf,
        target: PathBuf,
        error: String,
    },
}

/// A mandatory patch could not be applied.
///
/// Patches are order-dependent, so nothing after a failed patch is a valid
/// continuation point. This error is never handled inside the pipeline; it
/// ends the process with [`EXIT_FATAL_PATCH`].
#[derive(Error, Debug)]
#[error("Patch '{}' failed for stage '{stage}': {error}", .patch.display())]
pub struct FatalPatchError {
    /// Stage prefix the patch was selected by
    pub stage: String,
    /// The patch file or script
    pub patch: PathBuf,
    /// What went wrong
    pub error: String,
}

/// Stage and orchestration errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Bad invocation or unknown target
    #[error("{message}")]
    Usage { message: String },

    /// A prerequisite is missing; raised before any expensive work
    #[error("Stage '{stage}' cannot run: {reason}")]
    Precondition { stage: String, reason: String },

    /// Source fetch, configure or build step failed
    #[error("Stage '{stage}' failed: {error} (see log: {})", .log.display())]
    ExternalTool {
        stage: String,
        error: String,
        log: PathBuf,
    },

    /// Patch application failed; terminates the run
    #[error("{0}")]
    FatalPatch(#[from] FatalPatchError),

    /// Filesystem error outside an external tool
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Invalid configuration file
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Unreadable or invalid target manifest
    #[error("Target error: {0}")]
    Target(#[from] TargetError),
}

impl BuildError {
    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create a precondition error for a stage
    pub fn precondition(stage: &str, reason: impl Into<String>) -> Self {
        Self::Precondition {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage { .. } => EXIT_USAGE,
            Self::FatalPatch(_) => EXIT_FATAL_PATCH,
            Self::Precondition { .. }
            | Self::ExternalTool { .. }
            | Self::Filesystem(_)
            | Self::Settings(_)
            | Self::Target(_) => EXIT_FAILURE,
        }
    }

    /// Whether logs should be kept after this error
    ///
    /// Usage errors happen before any stage ran, so there is nothing to keep.
    pub fn retains_logs(&self) -> bool {
        !self.is_usage()
    }

    /// Whether the invocation itself was wrong
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }

    /// Name of the stage that failed, if known
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Precondition { stage, .. } | Self::ExternalTool { stage, .. } => Some(stage),
            Self::FatalPatch(e) => Some(&e.stage),
            _ => None,
        }
    }

    /// Log file to inspect, if the failure was captured in one
    pub fn log_path(&self) -> Option<&Path> {
        match self {
            Self::ExternalTool { log, .. } => Some(log),
            _ => None,
        }
    }
}
