//! CLI command implementations
//!
//! [`Options`] resolves the layered configuration (defaults, settings file,
//! environment, flags) once per invocation; the submodules implement the
//! commands on top of it.

pub mod build;
pub mod clean;

use std::path::{Path, PathBuf};

use crate::cli::{output, Cli};
use crate::config::defaults::{DEFAULT_TARGETS_DIR, DEFAULT_WORKSPACE_DIR};
use crate::core::context::{BuildContext, Isa};
use crate::core::pipeline::Pipeline;
use crate::core::settings::Settings;
use crate::core::target::TargetRegistry;
use crate::core::workspace::{LogSession, RunOutcome};
use crate::error::{BuildError, FilesystemError};
use crate::infra::dirs::RvforgeDirs;
use crate::infra::process::ProcessRunner;

/// Fully resolved invocation options
#[derive(Debug, Clone)]
pub struct Options {
    pub verbose: bool,
    pub force_refetch: bool,
    pub isa: Isa,
    pub jobs: usize,
    pub workspace: PathBuf,
    pub sources_dir: PathBuf,
    pub targets_dir: PathBuf,
    pub settings: Settings,
}

impl Options {
    /// Resolve options from the command line and the settings file
    pub fn from_cli(cli: &Cli) -> Result<Self, BuildError> {
        let dirs = RvforgeDirs::new();
        let settings = Settings::load(&dirs)?;
        let cwd = std::env::current_dir().map_err(|e| FilesystemError::ReadFile {
            path: PathBuf::from("."),
            error: e.to_string(),
        })?;
        Ok(Self::resolve(cli, settings, &dirs, &cwd))
    }

    /// Layer flags over settings over defaults; relative paths are anchored at `cwd`
    pub fn resolve(cli: &Cli, settings: Settings, dirs: &RvforgeDirs, cwd: &Path) -> Self {
        let workspace = cli
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE_DIR));
        let sources_dir = cli
            .sources_dir
            .clone()
            .or_else(|| settings.paths.sources.clone())
            .unwrap_or_else(|| dirs.sources_dir());
        let targets_dir = cli
            .targets_dir
            .clone()
            .or_else(|| settings.paths.targets.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGETS_DIR));
        let jobs = cli
            .jobs
            .or(settings.build.jobs)
            .unwrap_or_else(num_cpus::get)
            .max(1);

        Self {
            verbose: cli.verbose,
            force_refetch: cli.force_refetch,
            isa: cli.isa.unwrap_or_default(),
            jobs,
            workspace: cwd.join(workspace),
            sources_dir: cwd.join(sources_dir),
            targets_dir: cwd.join(targets_dir),
            settings,
        }
    }

    /// Registry over the configured targets directory
    pub fn registry(&self) -> TargetRegistry {
        TargetRegistry::new(self.targets_dir.clone())
    }

    /// Fresh build context without a target
    pub fn context(&self) -> BuildContext {
        let mut ctx = BuildContext::new(self.workspace.clone())
            .with_isa(self.isa)
            .with_jobs(self.jobs);
        ctx.force_refetch = self.force_refetch;
        ctx.verbose = self.verbose;
        ctx
    }
}

/// Run `stages` on a new pipeline, then settle the log session
///
/// Logs are kept when the stages fail or when running verbose; their
/// location is printed in that case.
pub fn run_stages<R, F>(
    options: &Options,
    ctx: BuildContext,
    runner: R,
    label: &str,
    stages: F,
) -> anyhow::Result<()>
where
    R: ProcessRunner,
    F: FnOnce(&mut Pipeline<R>) -> Result<(), BuildError>,
{
    let logs = LogSession::create(options.verbose)?;
    run_stages_with_logs(options, ctx, runner, logs, label, stages)
}

fn run_stages_with_logs<R, F>(
    options: &Options,
    ctx: BuildContext,
    runner: R,
    logs: LogSession,
    label: &str,
    stages: F,
) -> anyhow::Result<()>
where
    R: ProcessRunner,
    F: FnOnce(&mut Pipeline<R>) -> Result<(), BuildError>,
{
    let mut pipeline = Pipeline::new(
        ctx,
        options.settings.clone(),
        runner,
        logs,
        options.sources_dir.clone(),
    );

    let spinner = output::create_spinner(label, options.verbose);
    let result = stages(&mut pipeline);
    spinner.finish_and_clear();

    let outcome = match &result {
        Ok(()) => RunOutcome::Succeeded,
        Err(e) if !e.retains_logs() => RunOutcome::Usage,
        Err(_) => RunOutcome::Failed,
    };
    if let Some(dir) = pipeline.finish(outcome) {
        output::logs_kept(&dir);
    }

    result?;
    output::success(&format!("{label} done"));
    Ok(())
}
