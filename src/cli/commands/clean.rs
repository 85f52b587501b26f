//! CLI implementation for `rvforge cleanup`

use anyhow::{Context, Result};

use crate::cli::commands::Options;
use crate::cli::output;
use crate::core::clean::{clean_stale_sessions, clean_workspace};
use crate::core::workspace::Workspace;

/// Execute the cleanup command
pub fn execute(options: &Options) -> Result<()> {
    let workspace = Workspace::new(options.workspace.clone());
    let result = clean_workspace(&workspace).with_context(|| {
        format!("Failed to clean workspace {}", workspace.root().display())
    })?;
    let sessions = clean_stale_sessions(&std::env::temp_dir())
        .context("Failed to remove stale log directories")?;

    if result.removed.is_empty() && sessions.is_empty() {
        output::success("Nothing to clean");
        return Ok(());
    }

    output::success("Cleaned workspace:");
    for dir in result.removed.iter().chain(&sessions) {
        println!("  Removed {}", dir.display());
    }
    for dir in &result.kept {
        println!("  Kept {}", dir.display());
    }
    Ok(())
}
