//! Filesystem operations
//!
//! Handles file and directory operations. Every helper maps `std::io` errors
//! into [`FilesystemError`] with the offending path attached.

use std::path::Path;
use walkdir::WalkDir;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Remove a directory if present and create it again, empty
pub fn recreate_dir(path: &Path) -> Result<(), FilesystemError> {
    remove_dir_all(path)?;
    create_dir_all(path)
}

/// Remove a file if it exists
pub fn remove_file(path: &Path) -> Result<(), FilesystemError> {
    if path.symlink_metadata().is_ok() {
        std::fs::remove_file(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Write content to a file
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Copy a single file, creating the destination's parent directory
pub fn copy_file(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    std::fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| FilesystemError::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            error: e.to_string(),
        })
}

/// Recursively copy `from` into `to`, preserving symbolic links
///
/// Existing files in `to` are overwritten; nothing is removed.
pub fn copy_tree(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    let copy_err = |error: String| FilesystemError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error,
    };

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| copy_err(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| copy_err(e.to_string()))?;
        let dest = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|e| copy_err(e.to_string()))?;
            remove_file(&dest)?;
            symlink(&target, &dest)?;
        } else {
            copy_file(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Create a symbolic link at `link` pointing to `target`, replacing any file there
#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> Result<(), FilesystemError> {
    if let Some(parent) = link.parent() {
        create_dir_all(parent)?;
    }
    remove_file(link)?;
    std::os::unix::fs::symlink(target, link).map_err(|e| FilesystemError::Symlink {
        link: link.to_path_buf(),
        target: target.to_path_buf(),
        error: e.to_string(),
    })
}

#[cfg(not(unix))]
pub fn symlink(target: &Path, link: &Path) -> Result<(), FilesystemError> {
    let resolved = link.parent().map_or_else(|| target.to_path_buf(), |p| p.join(target));
    copy_file(&resolved, link)
}

/// Set mode 0755 on a file (Unix only)
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), FilesystemError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }
    })
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<(), FilesystemError> {
    Ok(())
}
