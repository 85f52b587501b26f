//! Workspace layout and build logs
//!
//! Every output has a deterministic path:
//!
//! - toolchains: `<root>/riscv-<type>-toolchain`
//! - emulator: `<root>/qemu`
//! - per-target artifacts: `<root>/<target>/<isa>/<component>`
//!
//! Logs live in a per-process directory under the system temp dir
//! (`rvforge-<pid>/logs/<stage>.log`), so independent runs never share log
//! files. The directory is discarded after a successful run unless verbose
//! mode asked to keep it; a failed run always keeps it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::defaults::EMULATOR_DIR;
use crate::core::context::Isa;
use crate::core::toolchain::ToolchainKind;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Prefix of per-process working directories in the temp dir
pub const SESSION_DIR_PREFIX: &str = "rvforge-";

/// Deterministic output layout under a workspace root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a layout rooted at `root`
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Install directory of a toolchain variant
    pub fn toolchain_dir(&self, kind: ToolchainKind) -> PathBuf {
        self.root.join(format!("riscv-{kind}-toolchain"))
    }

    /// Install directory of the emulator
    pub fn emulator_dir(&self) -> PathBuf {
        self.root.join(EMULATOR_DIR)
    }

    /// Directory holding all artifacts of a target
    pub fn target_dir(&self, target: &str) -> PathBuf {
        self.root.join(target)
    }

    /// Install directory of a component for a target and ISA
    pub fn artifact_dir(&self, target: &str, isa: Isa, component: &str) -> PathBuf {
        self.target_dir(target).join(isa.dir_name()).join(component)
    }
}

/// How a run ended, for log retention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage succeeded
    Succeeded,
    /// A stage failed
    Failed,
    /// The invocation was rejected before any stage ran
    Usage,
}

/// Per-process log directory with one file per stage
#[derive(Debug)]
pub struct LogSession {
    base: PathBuf,
    logs: PathBuf,
    retain: bool,
}

impl LogSession {
    /// Create the session directory for this process in the temp dir
    pub fn create(retain: bool) -> Result<Self, FilesystemError> {
        let base = std::env::temp_dir().join(format!(
            "{SESSION_DIR_PREFIX}{}",
            std::process::id()
        ));
        Self::in_dir(base, retain)
    }

    /// Create a session rooted at an explicit directory
    pub fn in_dir(base: PathBuf, retain: bool) -> Result<Self, FilesystemError> {
        let logs = base.join("logs");
        filesystem::create_dir_all(&logs)?;
        Ok(Self { base, logs, retain })
    }

    /// Directory holding the stage logs
    pub fn dir(&self) -> &Path {
        &self.logs
    }

    /// Open (or continue) the log of a stage and return its path
    pub fn stage_log(&self, stage: &str) -> Result<PathBuf, FilesystemError> {
        let path = self.logs.join(format!("{stage}.log"));
        let write_err = |e: std::io::Error| FilesystemError::WriteFile {
            path: path.clone(),
            error: e.to_string(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(write_err)?;
        writeln!(file, "==> stage {stage}").map_err(write_err)?;
        Ok(path)
    }

    /// End the session, returning the log directory if it was kept
    pub fn finish(self, outcome: RunOutcome) -> Option<PathBuf> {
        let keep = match outcome {
            RunOutcome::Failed => true,
            RunOutcome::Succeeded => self.retain,
            RunOutcome::Usage => false,
        };

        if keep {
            return Some(self.logs);
        }
        if let Err(e) = filesystem::remove_dir_all(&self.base) {
            tracing::warn!("Could not remove log directory: {e}");
        }
        None
    }
}
