//! Shared component build template
//!
//! Every component (emulator, kernel, bootloader, firmware, userspace
//! tools) runs the same sequence, driven by
//! [`Pipeline::run_component`](crate::core::pipeline::Pipeline::run_component):
//!
//! 1. preconditions: toolchain install, then the component's own checks
//! 2. source acquisition at the pinned ref
//! 3. patches, for components with a patch prefix; requests the scripts
//!    raise for the running component are taken and preconditions rechecked
//! 4. [`Component::configure`]
//! 5. [`Component::build`]
//! 6. install: the install directory is recreated, then
//!    [`Component::install`] populates it
//!
//! Implementations only describe the component-specific parts; the
//! [`StageIo`] handed to them runs commands with the stage's environment and
//! log.

use std::path::{Path, PathBuf};

use crate::core::build_env::BuildEnvironment;
use crate::core::context::{Abi, BuildContext, Isa, StageFlags};
use crate::core::kconfig::{self, ConfigTemplate};
use crate::core::toolchain::ToolchainKind;
use crate::error::{BuildError, FilesystemError};
use crate::infra::filesystem;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// A buildable component
pub trait Component {
    /// Stage name; also names the source cache entry and the log file
    fn name(&self) -> &'static str;

    /// Upstream repository URL
    fn url(&self) -> &'static str;

    /// Pinned tag or branch
    fn default_ref(&self) -> &'static str;

    /// Toolchain the component is compiled with, `None` for host builds
    fn toolchain(&self, isa: Isa) -> Option<ToolchainKind>;

    /// Prefix selecting this component's patches
    fn patch_prefix(&self) -> Option<&'static str> {
        None
    }

    /// ABI the component is built for
    fn abi(&self, isa: Isa) -> Abi {
        Abi::soft_float(isa)
    }

    /// Where the component is installed
    fn install_dir(&self, ctx: &BuildContext) -> Result<PathBuf, BuildError> {
        ctx.artifact_dir(self.name())
    }

    /// Empty the install directory before [`Component::install`]
    fn reset_install_dir(&self, dir: &Path) -> Result<(), FilesystemError> {
        filesystem::recreate_dir(dir)
    }

    /// Component-specific checks, run before any source or build action
    ///
    /// Checked again after patching, since patch scripts may change the
    /// context.
    fn check_preconditions(&self, _ctx: &BuildContext) -> Result<(), BuildError> {
        Ok(())
    }

    /// Take the requests this component's own patch scripts raised for it
    fn take_script_requests(&mut self, _flags: &mut StageFlags) {}

    /// Produce the build configuration
    fn configure(&self, io: &mut StageIo<'_>) -> Result<(), BuildError>;

    /// Run the external build
    fn build(&self, io: &mut StageIo<'_>) -> Result<(), BuildError>;

    /// Populate the (freshly recreated) install directory
    fn install(&self, io: &mut StageIo<'_>) -> Result<(), BuildError>;
}

/// What a component run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    /// Checked out and built source tree
    pub source_dir: PathBuf,
    /// Populated install directory
    pub install_dir: PathBuf,
}

/// Everything a component needs to run its external steps
pub struct StageIo<'a> {
    /// Stage name used in errors
    pub stage: &'static str,
    /// Current build context
    pub ctx: &'a BuildContext,
    /// Stage log
    pub log: PathBuf,
    /// Source tree
    pub source_dir: PathBuf,
    /// Install directory
    pub install_dir: PathBuf,
    /// Environment for external commands
    pub env: BuildEnvironment,
    runner: &'a mut dyn ProcessRunner,
}

impl<'a> StageIo<'a> {
    pub fn new(
        stage: &'static str,
        ctx: &'a BuildContext,
        runner: &'a mut dyn ProcessRunner,
        log: PathBuf,
        source_dir: PathBuf,
        install_dir: PathBuf,
        env: BuildEnvironment,
    ) -> Self {
        Self {
            stage,
            ctx,
            log,
            source_dir,
            install_dir,
            env,
            runner,
        }
    }

    /// Run a command with the stage environment, output going to the log
    pub fn run(&mut self, cmd: ExternalCommand) -> Result<(), BuildError> {
        let cmd = cmd.envs(&self.env.to_env_map());
        self.runner
            .run(&cmd, &self.log)
            .map_err(|e| BuildError::ExternalTool {
                stage: self.stage.to_string(),
                error: e.to_string(),
                log: self.log.clone(),
            })
    }

    /// `make -j<n>` in the source tree
    pub fn make(&self) -> ExternalCommand {
        ExternalCommand::new("make")
            .arg(self.env.jobs_arg())
            .current_dir(&self.source_dir)
    }

    /// `make ARCH=riscv CROSS_COMPILE=...` in the source tree, without `-j`
    pub fn kbuild(&self) -> ExternalCommand {
        ExternalCommand::new("make")
            .args(self.env.kbuild_vars())
            .current_dir(&self.source_dir)
    }

    /// Path inside the source tree
    pub fn source(&self, relative: &str) -> PathBuf {
        self.source_dir.join(relative)
    }

    /// Path inside the install directory
    pub fn installed(&self, relative: &str) -> PathBuf {
        self.install_dir.join(relative)
    }

    /// Target-provided config file for this stage, if any
    pub fn target_config(&self) -> Option<PathBuf> {
        self.ctx
            .target
            .as_ref()
            .and_then(|t| kconfig::target_config(&t.config_dir, self.stage))
    }

    /// Expand a config template and write it to `dest`
    pub fn render_config(&self, template: &Path, dest: &Path) -> Result<(), BuildError> {
        let mut config = ConfigTemplate::load(template)?;
        config.substitute(&self.env.substitutions());
        config.write(dest)?;
        tracing::debug!("{}: using config {}", self.stage, template.display());
        Ok(())
    }

    /// Copy one build output from the source tree into the install directory
    pub fn install_file(&self, from: &str, to: &str) -> Result<(), BuildError> {
        let source = self.source(from);
        self.require_output(&source)?;
        filesystem::copy_file(&source, &self.installed(to))?;
        Ok(())
    }

    /// Fail the stage if a declared output is missing
    pub fn require_output(&self, path: &Path) -> Result<(), BuildError> {
        if path.exists() {
            Ok(())
        } else {
            Err(BuildError::ExternalTool {
                stage: self.stage.to_string(),
                error: format!("expected output '{}' was not produced", path.display()),
                log: self.log.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::TargetInfo;
    use crate::test_utils::RecordingRunner;
    use tempfile::TempDir;

    fn io<'a>(
        temp: &TempDir,
        ctx: &'a BuildContext,
        runner: &'a mut RecordingRunner,
    ) -> StageIo<'a> {
        StageIo::new(
            "busybox",
            ctx,
            runner,
            temp.path().join("busybox.log"),
            temp.path().join("src"),
            temp.path().join("out"),
            BuildEnvironment::for_cross(
                ToolchainKind::Musl64,
                &temp.path().join("tc"),
                Isa::Rv64,
                Abi::soft_float(Isa::Rv64),
                temp.path().join("out"),
            )
            .with_jobs(3),
        )
    }

    #[test]
    fn test_run_adds_environment_and_maps_failure() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(temp.path().join("work"));
        let mut runner = RecordingRunner::new().fail_when(|cmd| cmd.has_arg("broken"));
        let mut io = io(&temp, &ctx, &mut runner);

        let make = io.make().arg("all");
        io.run(make).unwrap();
        let err = io.run(ExternalCommand::new("make").arg("broken")).unwrap_err();

        match err {
            BuildError::ExternalTool { stage, log, .. } => {
                assert_eq!(stage, "busybox");
                assert!(log.ends_with("busybox.log"));
            }
            other => panic!("Expected ExternalTool, got: {other:?}"),
        }

        let first = &runner.commands()[0];
        assert!(first.has_arg("-j3"));
        assert_eq!(
            first.env.get("CROSS_COMPILE").map(String::as_str),
            Some("riscv64-unknown-linux-musl-")
        );
    }

    #[test]
    fn test_render_target_config() {
        let temp = TempDir::new().unwrap();
        let configs = temp.path().join("configs");
        std::fs::create_dir_all(&configs).unwrap();
        std::fs::write(
            configs.join("busybox.config"),
            "CONFIG_CROSS_COMPILER_PREFIX=\"@CROSS_COMPILE@\"\nCONFIG_PREFIX=\"@PREFIX@\"\n",
        )
        .unwrap();

        let mut ctx = BuildContext::new(temp.path().join("work"));
        ctx.target = Some(TargetInfo {
            name: "qemu".to_string(),
            patch_dir: temp.path().join("patches"),
            config_dir: configs,
        });
        let mut runner = RecordingRunner::new();
        let io = io(&temp, &ctx, &mut runner);

        let template = io.target_config().unwrap();
        let dest = temp.path().join("src/.config");
        io.render_config(&template, &dest).unwrap();

        let rendered = std::fs::read_to_string(dest).unwrap();
        assert!(rendered.contains("\"riscv64-unknown-linux-musl-\""));
        assert!(rendered.contains(&temp.path().join("out").display().to_string()));
    }

    #[test]
    fn test_missing_output_is_reported() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(temp.path().join("work"));
        let mut runner = RecordingRunner::new();
        let io = io(&temp, &ctx, &mut runner);

        let err = io.install_file("busybox", "bin/busybox").unwrap_err();
        assert!(err.to_string().contains("was not produced"));
    }
}
