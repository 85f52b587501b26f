//! Build orchestration
//!
//! [`Pipeline`] owns everything a run needs: the [`BuildContext`], the
//! settings, the process runner, the log session and the source cache. Stages
//! run one at a time, in the order the caller asks for them; the first error
//! ends the sequence.
//!
//! The stage entry points live next to their components (`build_toolchain`
//! in [`toolchain`](crate::core::toolchain), `build_kernel` in
//! [`kernel`](crate::core::kernel), ...). This module holds the shared parts:
//! the generic component template, source and patch handling, and step
//! dispatch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::build_env::BuildEnvironment;
use crate::core::component::{Component, StageIo, StageOutput};
use crate::core::context::BuildContext;
use crate::core::patch::PatchApplier;
use crate::core::settings::Settings;
use crate::core::target::{Step, StepExecutor};
use crate::core::toolchain::ToolchainKind;
use crate::core::workspace::{LogSession, RunOutcome};
use crate::error::BuildError;
use crate::infra::git::GitOperations;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// Runs build stages against one context
pub struct Pipeline<R: ProcessRunner> {
    pub(crate) ctx: BuildContext,
    pub(crate) settings: Settings,
    pub(crate) runner: R,
    logs: LogSession,
    git: GitOperations,
    refetched: HashSet<String>,
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Create a pipeline
    ///
    /// # Arguments
    /// * `ctx` - Build context for the run
    /// * `settings` - Loaded settings file
    /// * `runner` - Executes external commands
    /// * `logs` - Log session receiving stage output
    /// * `sources_dir` - Root of the shared source cache
    pub fn new(
        ctx: BuildContext,
        settings: Settings,
        runner: R,
        logs: LogSession,
        sources_dir: PathBuf,
    ) -> Self {
        Self {
            ctx,
            settings,
            runner,
            logs,
            git: GitOperations::new(sources_dir),
            refetched: HashSet::new(),
        }
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut BuildContext {
        &mut self.ctx
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// End the run, returning the log directory if it was kept
    pub fn finish(self, outcome: RunOutcome) -> Option<PathBuf> {
        self.logs.finish(outcome)
    }

    /// Run one component through the shared build template
    pub fn run_component(
        &mut self,
        component: &mut dyn Component,
    ) -> Result<StageOutput, BuildError> {
        let stage = component.name();

        if let Some(kind) = component.toolchain(self.ctx.isa) {
            self.require_toolchain(stage, kind)?;
        }
        component.check_preconditions(&self.ctx)?;
        component.install_dir(&self.ctx)?;

        let log = self.open_log(stage)?;
        tracing::info!("Building {stage} ({})", self.ctx.isa);
        let source_dir = self.fetch_source(
            stage,
            stage,
            component.url(),
            component.default_ref(),
            &log,
        )?;

        if let Some(prefix) = component.patch_prefix() {
            self.apply_patches(prefix, &source_dir, &log)?;
            component.take_script_requests(&mut self.ctx.flags);
            component.check_preconditions(&self.ctx)?;
        }

        // Patch scripts may have changed the ISA; resolve everything again.
        let isa = self.ctx.isa;
        let install_dir = component.install_dir(&self.ctx)?;
        let env = match component.toolchain(isa) {
            Some(kind) => BuildEnvironment::for_cross(
                kind,
                &self.require_toolchain(stage, kind)?,
                isa,
                component.abi(isa),
                install_dir.clone(),
            ),
            None => BuildEnvironment::for_host(isa, install_dir.clone()),
        }
        .with_jobs(self.ctx.jobs);

        let mut io = StageIo::new(
            stage,
            &self.ctx,
            &mut self.runner,
            log,
            source_dir,
            install_dir,
            env,
        );
        component.configure(&mut io)?;
        component.build(&mut io)?;
        component.reset_install_dir(&io.install_dir)?;
        component.install(&mut io)?;

        tracing::info!("{stage} installed to {}", io.install_dir.display());
        Ok(StageOutput {
            source_dir: io.source_dir,
            install_dir: io.install_dir,
        })
    }

    /// Run a single step of a command sequence
    pub fn run_step(&mut self, step: &Step) -> Result<(), BuildError> {
        tracing::debug!("Step {step}");
        match *step {
            Step::Toolchain(kind) => {
                self.build_toolchain(kind)?;
            }
            Step::Qemu => {
                self.build_qemu()?;
            }
            Step::Kernel { initramfs } => {
                if initramfs {
                    self.ctx.flags.embed_initramfs.arm();
                }
                self.build_kernel()?;
            }
            Step::Rootfs { noimage } => {
                if noimage {
                    self.ctx.flags.skip_rootfs_image.arm();
                }
                self.build_rootfs()?;
            }
            Step::Bootloader { payload } => {
                if payload {
                    self.ctx.flags.embed_payload.arm();
                }
                self.build_bootloader()?;
            }
            Step::Firmware { payload } => {
                if payload {
                    self.ctx.flags.embed_payload.arm();
                }
                self.build_firmware()?;
            }
            Step::Busybox => {
                self.build_busybox()?;
            }
            Step::Dropbear => {
                self.build_dropbear()?;
            }
        }
        Ok(())
    }

    /// Every toolchain variant, then the emulator
    pub fn bootstrap_generic(&mut self) -> Result<(), BuildError> {
        for kind in ToolchainKind::ALL {
            self.build_toolchain(kind)?;
        }
        self.build_qemu()?;
        Ok(())
    }

    /// Fail unless the toolchain is installed; returns its directory
    pub(crate) fn require_toolchain(
        &self,
        stage: &str,
        kind: ToolchainKind,
    ) -> Result<PathBuf, BuildError> {
        let dir = self.ctx.workspace.toolchain_dir(kind);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(BuildError::precondition(
                stage,
                format!(
                    "{kind} toolchain not found at {} (run build_toolchain {kind} first)",
                    dir.display()
                ),
            ))
        }
    }

    pub(crate) fn open_log(&self, stage: &str) -> Result<PathBuf, BuildError> {
        Ok(self.logs.stage_log(stage)?)
    }

    /// Acquire a source tree, honoring settings overrides
    ///
    /// With force-refetch, each cache entry is re-cloned once per run.
    pub(crate) fn fetch_source(
        &mut self,
        stage: &str,
        component: &str,
        url: &str,
        git_ref: &str,
        log: &Path,
    ) -> Result<PathBuf, BuildError> {
        let url = self.settings.source_url(component, url).to_string();
        let git_ref = self
            .settings
            .source_ref(component, Some(git_ref))
            .map(str::to_string);
        let repo = self.git.repository(component, &url, git_ref.as_deref());

        let clear = self.ctx.force_refetch && self.refetched.insert(component.to_string());
        GitOperations::fetch(&mut self.runner, &repo, clear, log).map_err(|e| {
            BuildError::ExternalTool {
                stage: stage.to_string(),
                error: e.to_string(),
                log: log.to_path_buf(),
            }
        })?;
        Ok(repo.path)
    }

    fn apply_patches(
        &mut self,
        prefix: &str,
        source_dir: &Path,
        log: &Path,
    ) -> Result<(), BuildError> {
        let Some(patch_dir) = self.ctx.target.as_ref().map(|t| t.patch_dir.clone()) else {
            return Ok(());
        };

        let applied = PatchApplier::new(&mut self.runner, prefix, source_dir, log).apply(
            &patch_dir,
            prefix,
            &mut self.ctx,
        )?;
        if applied > 0 {
            tracing::info!("Applied {applied} {prefix} patch(es)");
        }
        Ok(())
    }

    /// Run a command outside the component template
    pub(crate) fn run_logged(
        &mut self,
        stage: &str,
        cmd: &ExternalCommand,
        log: &Path,
    ) -> Result<(), BuildError> {
        self.runner
            .run(cmd, log)
            .map_err(|e| BuildError::ExternalTool {
                stage: stage.to_string(),
                error: e.to_string(),
                log: log.to_path_buf(),
            })
    }
}

impl<R: ProcessRunner> StepExecutor for Pipeline<R> {
    fn run_step(&mut self, step: &Step) -> Result<(), BuildError> {
        Pipeline::run_step(self, step)
    }

    fn bootstrap_generic(&mut self) -> Result<(), BuildError> {
        Pipeline::bootstrap_generic(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::TargetInfo;
    use crate::core::settings::SourcePin;
    use crate::test_utils::RecordingRunner;
    use tempfile::TempDir;

    fn pipeline(temp: &TempDir, runner: RecordingRunner) -> Pipeline<RecordingRunner> {
        let mut ctx = BuildContext::new(temp.path().join("work"));
        ctx.target = Some(TargetInfo {
            name: "qemu".to_string(),
            patch_dir: temp.path().join("patches"),
            config_dir: temp.path().join("configs"),
        });
        let logs = LogSession::in_dir(temp.path().join("logs"), false).unwrap();
        Pipeline::new(ctx, Settings::default(), runner, logs, temp.path().join("sources"))
    }

    #[test]
    fn test_component_without_toolchain_fetches_nothing() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&temp, RecordingRunner::new());

        let err = pipeline.build_busybox().unwrap_err();

        assert!(matches!(err, BuildError::Precondition { .. }));
        assert!(err.to_string().contains("musl64"));
        assert!(pipeline.runner().commands().is_empty());
    }

    #[test]
    fn test_settings_pin_overrides_source() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&temp, RecordingRunner::new());
        pipeline.settings.sources.insert(
            "linux".to_string(),
            SourcePin {
                url: Some("https://mirror.example/linux.git".to_string()),
                git_ref: Some("v6.7".to_string()),
            },
        );

        let log = temp.path().join("linux.log");
        pipeline
            .fetch_source("linux", "linux", "https://default/linux.git", "v6.6", &log)
            .unwrap();

        let clone = &pipeline.runner().commands()[0];
        assert!(clone.has_arg("https://mirror.example/linux.git"));
        assert!(clone.has_arg("v6.7"));
    }

    #[test]
    fn test_force_refetch_reclones_once_per_run() {
        let temp = TempDir::new().unwrap();
        let runner = RecordingRunner::new().on_success(|cmd| {
            if cmd.has_arg("clone") {
                let path = cmd.args.last().unwrap();
                std::fs::create_dir_all(Path::new(path).join(".git")).unwrap();
            }
        });
        let mut pipeline = pipeline(&temp, runner);
        pipeline.ctx.force_refetch = true;
        std::fs::create_dir_all(temp.path().join("sources/musl/.git")).unwrap();

        let log = temp.path().join("musl.log");
        pipeline.fetch_source("t", "musl", "u", "v1", &log).unwrap();
        pipeline.fetch_source("t", "musl", "u", "v1", &log).unwrap();

        let commands = pipeline.runner().commands();
        assert_eq!(commands[0].args[0], "clone");
        assert!(commands[1..].iter().all(|c| !c.has_arg("clone")));
    }

    #[test]
    fn test_steps_arm_one_shot_flags_for_their_stage() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&temp, RecordingRunner::new());

        // The bootloader consumes the payload request even when it cannot run.
        let err = pipeline
            .run_step(&Step::Bootloader { payload: true })
            .unwrap_err();
        assert!(matches!(err, BuildError::Precondition { .. }));
        assert!(!pipeline.context().flags.embed_payload.is_armed());
    }
}
