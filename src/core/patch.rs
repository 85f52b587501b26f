//! Ordered patch application
//!
//! A target's patch directory holds two kinds of patches, selected by the
//! stage prefix (`linux`, `riscv-pk`, ...):
//!
//! - `<prefix>*.patch` files, applied with `git apply` at the source root
//! - `<prefix>*.sh` scripts, run with `sh` at the source root
//!
//! Each kind is applied in filename order, files first. Scripts receive the
//! build context as `RVFORGE_*` environment variables and may change it by
//! writing `KEY=VALUE` lines to the file named by `RVFORGE_CONTEXT_FILE`.
//!
//! Patches depend on their predecessors, so the first failure ends the run
//! with a [`FatalPatchError`].

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::core::context::BuildContext;
use crate::error::FatalPatchError;
use crate::infra::filesystem;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// Environment variable naming the context change file
pub const CONTEXT_FILE_VAR: &str = "RVFORGE_CONTEXT_FILE";

/// Patches selected for one stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    /// File patches, in application order
    pub patches: Vec<PathBuf>,
    /// Script patches, in application order
    pub scripts: Vec<PathBuf>,
}

impl PatchSet {
    /// Collect the patches for `prefix` from `patch_dir`
    ///
    /// A missing directory yields an empty set.
    pub fn discover(patch_dir: &Path, prefix: &str) -> Result<Self, FatalPatchError> {
        let mut set = Self::default();
        if !patch_dir.is_dir() {
            return Ok(set);
        }

        let entries = WalkDir::new(patch_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in entries {
            let entry = entry.map_err(|e| FatalPatchError {
                stage: prefix.to_string(),
                patch: patch_dir.to_path_buf(),
                error: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !name.starts_with(prefix) {
                continue;
            }
            if name.ends_with(".patch") {
                set.patches.push(entry.into_path());
            } else if name.ends_with(".sh") {
                set.scripts.push(entry.into_path());
            }
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.scripts.is_empty()
    }

    /// Number of patches and scripts
    pub fn len(&self) -> usize {
        self.patches.len() + self.scripts.len()
    }
}

/// Applies a [`PatchSet`] to a source tree
pub struct PatchApplier<'a> {
    runner: &'a mut dyn ProcessRunner,
    stage: &'a str,
    source_dir: &'a Path,
    log: &'a Path,
}

impl<'a> PatchApplier<'a> {
    pub fn new(
        runner: &'a mut dyn ProcessRunner,
        stage: &'a str,
        source_dir: &'a Path,
        log: &'a Path,
    ) -> Self {
        Self {
            runner,
            stage,
            source_dir,
            log,
        }
    }

    /// Apply every patch for `prefix` found in `patch_dir`
    ///
    /// Returns the number of patches applied.
    pub fn apply(
        &mut self,
        patch_dir: &Path,
        prefix: &str,
        ctx: &mut BuildContext,
    ) -> Result<usize, FatalPatchError> {
        let set = PatchSet::discover(patch_dir, prefix)?;
        if set.is_empty() {
            tracing::debug!("No patches for {prefix} in {}", patch_dir.display());
            return Ok(0);
        }

        for patch in &set.patches {
            tracing::info!("Applying {}", file_name(patch));
            let cmd = ExternalCommand::new("git")
                .arg("apply")
                .arg_path(patch)
                .current_dir(self.source_dir);
            self.runner
                .run(&cmd, self.log)
                .map_err(|e| self.fatal(patch, e.to_string()))?;
        }

        for script in &set.scripts {
            tracing::info!("Running {}", file_name(script));
            self.run_script(script, ctx)?;
        }

        Ok(set.len())
    }

    fn run_script(&mut self, script: &Path, ctx: &mut BuildContext) -> Result<(), FatalPatchError> {
        let context_file = self
            .log
            .with_file_name(format!("{}.context", self.stage));
        filesystem::write_file(&context_file, "").map_err(|e| self.fatal(script, e.to_string()))?;

        let cmd = ExternalCommand::new("sh")
            .arg_path(script)
            .current_dir(self.source_dir)
            .envs(&ctx.to_env())
            .env(CONTEXT_FILE_VAR, context_file.display().to_string())
            .env("RVFORGE_SOURCE_DIR", self.source_dir.display().to_string());
        self.runner
            .run(&cmd, self.log)
            .map_err(|e| self.fatal(script, e.to_string()))?;

        let changes =
            filesystem::read_file(&context_file).map_err(|e| self.fatal(script, e.to_string()))?;
        for line in changes.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| self.fatal(script, format!("malformed context line '{line}'")))?;
            ctx.apply_override(key.trim(), value.trim())
                .map_err(|e| self.fatal(script, e))?;
            tracing::debug!("{} set {key}={value}", file_name(script));
        }
        Ok(())
    }

    fn fatal(&self, patch: &Path, error: String) -> FatalPatchError {
        FatalPatchError {
            stage: self.stage.to_string(),
            patch: patch.to_path_buf(),
            error,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
