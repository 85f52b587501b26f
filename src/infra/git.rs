//! Git operations
//!
//! Acquires and refreshes versioned source trees in the shared source cache.
//! Mutating operations go through the git CLI (via [`ProcessRunner`], so their
//! output lands in the stage log); read-only inspection uses the gix crate.
//!
//! A cache entry moves through these states:
//!
//! - **Absent**: nothing at the cache path (or something that is not a git
//!   checkout, which is discarded) → shallow clone.
//! - **Cloned**: refreshed in place unless a clean re-fetch is requested.
//!   Refreshing is idempotent: a stale or locally modified tree converges to
//!   the same state as an up-to-date one.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::infra::process::{ExternalCommand, ProcessError, ProcessRunner};

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// A git command failed
    #[error("git {step} failed for '{repo}': {error}")]
    Command {
        repo: String,
        step: String,
        error: ProcessError,
    },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// A versioned source tree and its place in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepository {
    /// Component name; also the cache key
    pub name: String,
    /// Remote location
    pub url: String,
    /// Pinned tag or branch, if any
    pub git_ref: Option<String>,
    /// Local checkout path
    pub path: PathBuf,
}

/// State of a cache entry on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Nothing at the cache path
    Absent,
    /// A git checkout exists
    Cloned,
    /// A directory exists but is not a git checkout
    Foreign,
}

/// What a fetch did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAction {
    /// Fresh clone into an empty cache slot
    Cloned,
    /// Existing checkout deleted and cloned again
    Recloned,
    /// Existing checkout reset and updated in place
    Refreshed,
}

/// Source cache operations
#[derive(Debug, Clone)]
pub struct GitOperations {
    /// Root of the shared source cache
    work_dir: PathBuf,
}

impl GitOperations {
    /// Create a new git operations handler rooted at the source cache
    pub fn new(work_dir: PathBuf) -> Self {
        Self { work_dir }
    }

    /// Describe the repository for a component
    ///
    /// The cache path depends only on the component name, so every stage
    /// that uses the same component shares one checkout.
    pub fn repository(&self, name: &str, url: &str, git_ref: Option<&str>) -> SourceRepository {
        SourceRepository {
            name: name.to_string(),
            url: url.to_string(),
            git_ref: git_ref.map(str::to_string),
            path: self.work_dir.join(name),
        }
    }

    /// Inspect the cache entry for a repository
    pub fn state(repo: &SourceRepository) -> SourceState {
        if !repo.path.exists() {
            SourceState::Absent
        } else if repo.path.join(".git").exists() {
            SourceState::Cloned
        } else {
            SourceState::Foreign
        }
    }

    /// Fetch or refresh a repository
    ///
    /// # Arguments
    /// * `runner` - Executes the git commands
    /// * `repo` - Repository to acquire
    /// * `clear_existing` - Delete any existing checkout and clone again
    /// * `log` - Stage log receiving git's output
    pub fn fetch(
        runner: &mut dyn ProcessRunner,
        repo: &SourceRepository,
        clear_existing: bool,
        log: &Path,
    ) -> Result<FetchAction, GitError> {
        let action = match (Self::state(repo), clear_existing) {
            (SourceState::Absent, _) => {
                Self::clone_repo(runner, repo, log)?;
                FetchAction::Cloned
            }
            (SourceState::Foreign, _) | (SourceState::Cloned, true) => {
                Self::remove_checkout(&repo.path)?;
                Self::clone_repo(runner, repo, log)?;
                FetchAction::Recloned
            }
            (SourceState::Cloned, false) => {
                Self::refresh(runner, repo, log)?;
                FetchAction::Refreshed
            }
        };

        match Self::head_commit(&repo.path) {
            Some(sha) => tracing::debug!("{} at {sha} ({action:?})", repo.name),
            None => tracing::debug!("{} fetched ({action:?})", repo.name),
        }
        Ok(action)
    }

    /// Shallow clone with submodules, optionally at a branch or tag
    fn clone_repo(
        runner: &mut dyn ProcessRunner,
        repo: &SourceRepository,
        log: &Path,
    ) -> Result<(), GitError> {
        if let Some(parent) = repo.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GitError::IoError {
                path: parent.to_path_buf(),
                error: e.to_string(),
            })?;
        }

        let mut cmd = ExternalCommand::new("git").args([
            "clone",
            "--depth",
            "1",
            "--recurse-submodules",
            "--shallow-submodules",
        ]);
        if let Some(git_ref) = &repo.git_ref {
            cmd = cmd.arg("--branch").arg(git_ref);
        }
        let cmd = cmd.arg(&repo.url).arg_path(&repo.path);

        Self::run_step(runner, repo, "clone", &cmd, log)
    }

    /// Force the checkout back to the pinned ref and bring it up to date
    fn refresh(
        runner: &mut dyn ProcessRunner,
        repo: &SourceRepository,
        log: &Path,
    ) -> Result<(), GitError> {
        let git = || ExternalCommand::new("git").arg("-C").arg_path(&repo.path);

        let target = repo.git_ref.as_deref().unwrap_or("HEAD");
        Self::run_step(
            runner,
            repo,
            "checkout",
            &git().args(["checkout", "--force", target]),
            log,
        )?;
        Self::run_step(runner, repo, "clean", &git().args(["clean", "-ffd"]), log)?;

        // A pinned tag leaves HEAD detached; there is nothing to pull then.
        if Self::head_is_detached(&repo.path) {
            tracing::debug!("{} is pinned at a detached ref, skipping pull", repo.name);
        } else {
            Self::run_step(runner, repo, "pull", &git().args(["pull", "--ff-only"]), log)?;
        }

        Self::run_step(
            runner,
            repo,
            "submodule update",
            &git().args(["submodule", "update", "--init", "--recursive", "--force"]),
            log,
        )
    }

    fn run_step(
        runner: &mut dyn ProcessRunner,
        repo: &SourceRepository,
        step: &str,
        cmd: &ExternalCommand,
        log: &Path,
    ) -> Result<(), GitError> {
        runner.run(cmd, log).map_err(|error| GitError::Command {
            repo: repo.url.clone(),
            step: step.to_string(),
            error,
        })
    }

    fn remove_checkout(path: &Path) -> Result<(), GitError> {
        std::fs::remove_dir_all(path).map_err(|e| GitError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Resolve the checked out commit, if the path is a readable repository
    pub fn head_commit(path: &Path) -> Option<String> {
        let repo = gix::open(path).ok()?;
        let id = repo.head_id().ok()?;
        Some(id.detach().to_string())
    }

    fn head_is_detached(path: &Path) -> bool {
        gix::open(path)
            .ok()
            .and_then(|repo| repo.head().ok().map(|head| head.is_detached()))
            .unwrap_or(false)
    }
}
