//! Cleanup logic
//!
//! Removes everything a rebuild can reproduce cheaply: per-target artifact
//! trees, the emulator install, and log directories left behind by runs that
//! are no longer alive. Toolchain installs and the source cache are kept.

use std::path::{Path, PathBuf};

use crate::core::workspace::{Workspace, SESSION_DIR_PREFIX};
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Result of a cleanup
#[derive(Debug, Default)]
pub struct CleanResult {
    /// Directories that were removed
    pub removed: Vec<PathBuf>,
    /// Directories that were kept
    pub kept: Vec<PathBuf>,
}

fn is_toolchain_dir(name: &str) -> bool {
    name.starts_with("riscv-") && name.ends_with("-toolchain")
}

/// Remove artifact trees and the emulator from a workspace
///
/// A missing workspace is not an error.
pub fn clean_workspace(workspace: &Workspace) -> Result<CleanResult, FilesystemError> {
    let mut result = CleanResult::default();
    let root = workspace.root();
    if !root.is_dir() {
        return Ok(result);
    }

    let entries = std::fs::read_dir(root).map_err(|e| FilesystemError::ReadFile {
        path: root.to_path_buf(),
        error: e.to_string(),
    })?;
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    paths.sort();

    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_toolchain_dir(&name) {
            result.kept.push(path);
        } else {
            tracing::info!("Removing {}", path.display());
            filesystem::remove_dir_all(&path)?;
            result.removed.push(path);
        }
    }
    Ok(result)
}

/// Whether a process is still running
///
/// Without `/proc` liveness cannot be judged and every process counts as
/// alive.
fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    !proc_root.join("self").exists() || proc_root.join(pid.to_string()).exists()
}

/// Remove `rvforge-<pid>` directories of dead processes from `temp_dir`
pub fn clean_stale_sessions(temp_dir: &Path) -> Result<Vec<PathBuf>, FilesystemError> {
    let own_pid = std::process::id();
    let Ok(entries) = std::fs::read_dir(temp_dir) else {
        return Ok(Vec::new());
    };

    let mut removed = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(pid) = name
            .strip_prefix(SESSION_DIR_PREFIX)
            .and_then(|pid| pid.parse::<u32>().ok())
        else {
            continue;
        };
        if pid == own_pid || process_alive(pid) {
            continue;
        }

        let path = entry.path();
        tracing::debug!("Removing stale session {}", path.display());
        filesystem::remove_dir_all(&path)?;
        removed.push(path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::Isa;
    use crate::core::toolchain::ToolchainKind;
    use tempfile::TempDir;

    #[test]
    fn test_clean_keeps_toolchains() {
        let temp = TempDir::new().unwrap();
        let workspace = Workspace::new(temp.path().join("work"));
        let toolchain = workspace.toolchain_dir(ToolchainKind::Glibc);
        let kernel = workspace.artifact_dir("unleashed", Isa::Rv64, "linux");
        std::fs::create_dir_all(toolchain.join("bin")).unwrap();
        std::fs::create_dir_all(&kernel).unwrap();
        std::fs::create_dir_all(workspace.emulator_dir().join("bin")).unwrap();

        let result = clean_workspace(&workspace).unwrap();

        assert!(toolchain.join("bin").is_dir());
        assert!(!workspace.target_dir("unleashed").exists());
        assert!(!workspace.emulator_dir().exists());
        assert_eq!(result.removed.len(), 2);
        assert_eq!(result.kept, vec![toolchain]);
    }

    #[test]
    fn test_clean_missing_workspace() {
        let temp = TempDir::new().unwrap();
        let workspace = Workspace::new(temp.path().join("absent"));

        let result = clean_workspace(&workspace).unwrap();

        assert!(result.removed.is_empty());
        assert!(!workspace.root().exists());
    }

    #[test]
    fn test_toolchain_dir_names() {
        assert!(is_toolchain_dir("riscv-musl32-toolchain"));
        assert!(!is_toolchain_dir("qemu"));
        assert!(!is_toolchain_dir("riscv-pk"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stale_sessions_of_dead_processes_are_removed() {
        let temp = TempDir::new().unwrap();
        // Above the kernel's pid_max ceiling, so never a live process.
        let dead = temp.path().join(format!("{SESSION_DIR_PREFIX}4194305"));
        let own = temp
            .path()
            .join(format!("{SESSION_DIR_PREFIX}{}", std::process::id()));
        let unrelated = temp.path().join("rvforge-notes");
        for dir in [&dead, &own, &unrelated] {
            std::fs::create_dir_all(dir.join("logs")).unwrap();
        }

        let removed = clean_stale_sessions(temp.path()).unwrap();

        assert_eq!(removed, vec![dead.clone()]);
        assert!(!dead.exists());
        assert!(own.exists());
        assert!(unrelated.exists());
    }
}
