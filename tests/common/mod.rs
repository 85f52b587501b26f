//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a temporary
//! project directory and a [`ProcessRunner`] that simulates the external
//! build tools by producing their declared outputs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rvforge::core::context::{BuildContext, Isa};
use rvforge::core::patch::CONTEXT_FILE_VAR;
use rvforge::core::pipeline::Pipeline;
use rvforge::core::settings::Settings;
use rvforge::core::target::{Target, TargetRegistry};
use rvforge::core::toolchain::ToolchainKind;
use rvforge::core::workspace::LogSession;
use rvforge::infra::process::{ExternalCommand, ProcessError, ProcessRunner};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory holding the workspace, source cache,
/// targets directory and log session of a test run.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn workspace(&self) -> PathBuf {
        self.path().join("work")
    }

    pub fn sources(&self) -> PathBuf {
        self.path().join("sources")
    }

    pub fn targets(&self) -> PathBuf {
        self.path().join("targets")
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        std::fs::create_dir_all(self.dir.path().join(name)).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Pretend every toolchain variant has been built
    pub fn install_toolchains(&self) {
        let ctx = BuildContext::new(self.workspace());
        for kind in ToolchainKind::ALL {
            std::fs::create_dir_all(ctx.workspace.toolchain_dir(kind).join("bin"))
                .expect("Failed to create toolchain directory");
        }
    }

    /// Pipeline for `target` over the simulated tools
    pub fn pipeline(&self, target: &str, isa: Isa) -> Pipeline<SimulatedTools> {
        self.pipeline_with(target, isa, SimulatedTools::new())
    }

    pub fn pipeline_with(
        &self,
        target: &str,
        isa: Isa,
        tools: SimulatedTools,
    ) -> Pipeline<SimulatedTools> {
        let mut ctx = BuildContext::new(self.workspace()).with_isa(isa).with_jobs(2);
        let registry = TargetRegistry::new(self.targets());
        let target = registry.resolve(target).expect("Failed to resolve target");
        target
            .prepare_environment(&mut ctx)
            .expect("Failed to prepare target");

        let logs = LogSession::in_dir(self.path().join("session"), false)
            .expect("Failed to create log session");
        Pipeline::new(ctx, Settings::default(), tools, logs, self.sources())
    }

    /// Resolve a target from the project's targets directory
    pub fn target(&self, name: &str) -> Box<dyn Target> {
        TargetRegistry::new(self.targets())
            .resolve(name)
            .expect("Failed to resolve target")
    }

    /// Run the rvforge binary inside the project
    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_rvforge"));
        cmd.current_dir(self.path())
            .env_remove("RUST_LOG")
            .env("RVFORGE_CONFIG_DIR", self.path().join("config"))
            .env("RVFORGE_CACHE_DIR", self.path().join("cache"))
            .env("RVFORGE_WORKSPACE", self.workspace())
            .env("RVFORGE_SOURCES_DIR", self.sources())
            .env("RVFORGE_TARGETS_DIR", self.targets())
            .args(args);
        cmd.output().expect("Failed to execute rvforge")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

type FailWhen = Box<dyn Fn(&ExternalCommand) -> bool>;

/// Stand-in for git, configure, make, patch scripts and the archivers
///
/// Records every command and creates the files each tool would have
/// produced, so the stages' output checks pass.
pub struct SimulatedTools {
    pub commands: Vec<ExternalCommand>,
    fail: Option<FailWhen>,
    modules: bool,
    script_context: String,
}

impl SimulatedTools {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            fail: None,
            modules: true,
            script_context: String::new(),
        }
    }

    /// Fail every command matching `predicate`
    pub fn failing(mut self, predicate: impl Fn(&ExternalCommand) -> bool + 'static) -> Self {
        self.fail = Some(Box::new(predicate));
        self
    }

    /// Kernel configs produced by defconfig have `CONFIG_MODULES` off
    pub fn without_modules(mut self) -> Self {
        self.modules = false;
        self
    }

    /// Patch scripts write `context` to the context file
    pub fn scripts_writing(mut self, context: &str) -> Self {
        self.script_context = context.to_string();
        self
    }

    /// Rendered command lines, for order assertions
    pub fn lines(&self) -> Vec<String> {
        self.commands.iter().map(ToString::to_string).collect()
    }

    fn simulate(&self, cmd: &ExternalCommand) {
        if cmd.program == "git" && cmd.has_arg("clone") {
            let path = cmd.args.last().expect("clone without path");
            write(&Path::new(path).join(".git/HEAD"), "ref: refs/heads/main\n");
            return;
        }

        let Some(cwd) = cmd.cwd.as_deref() else {
            return;
        };
        let component = cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match (cmd.program.as_str(), component.as_str()) {
            ("make", "linux") => self.kbuild(cmd, cwd),
            ("make", "busybox") => {
                if cmd.has_arg("defconfig") {
                    write(&cwd.join(".config"), "# CONFIG_STATIC is not set\nCONFIG_TC=y\n");
                } else if let Some(prefix) = cmd.make_var("CONFIG_PREFIX") {
                    write(&Path::new(prefix).join("bin/busybox"), "busybox");
                }
            }
            ("make", "dropbear") if cmd.has_arg("MULTI=1") => {
                write(&cwd.join("dropbearmulti"), "dropbear");
            }
            ("make", "build") if cmd.has_arg("bbl") => write(&cwd.join("bbl"), "bbl"),
            ("make", "opensbi") => {
                if let (Some(platform), Some(out)) = (cmd.make_var("PLATFORM"), cmd.make_var("O")) {
                    let firmware = Path::new(out).join("platform").join(platform).join("firmware");
                    write(&firmware.join("fw_dynamic.bin"), "sbi");
                    write(&firmware.join("fw_jump.elf"), "sbi");
                    if cmd.make_var("FW_PAYLOAD_PATH").is_some() {
                        write(&firmware.join("fw_payload.elf"), "sbi+kernel");
                    }
                }
            }
            ("sh", _) => {
                if let Some(file) = cmd.env.get(CONTEXT_FILE_VAR) {
                    write(Path::new(file), &self.script_context);
                }
            }
            ("find", _) => write(cmd.stdout.as_deref().expect("find without output"), ".\n"),
            ("cpio", _) => write(cmd.stdout.as_deref().expect("cpio without output"), "070701"),
            ("gzip", _) => {
                let archive = cmd.args.last().expect("gzip without file");
                write(Path::new(&format!("{archive}.gz")), "gzip");
                std::fs::remove_file(archive).expect("Failed to remove archive");
            }
            _ => {}
        }
    }

    fn kbuild(&self, cmd: &ExternalCommand, source: &Path) {
        if cmd.has_arg("defconfig") {
            let modules = if self.modules {
                "CONFIG_MODULES=y\n"
            } else {
                "# CONFIG_MODULES is not set\n"
            };
            write(
                &source.join(".config"),
                &format!("CONFIG_ARCH_RV64I=y\n{modules}"),
            );
        } else if cmd.has_arg("modules_install") {
            let root = cmd.make_var("INSTALL_MOD_PATH").expect("no module path");
            write(&Path::new(root).join("lib/modules/6.6.0/modules.dep"), "");
        } else if cmd.args.iter().any(|a| a.starts_with("-j")) {
            let config = std::fs::read_to_string(source.join(".config")).unwrap_or_default();
            let image = if config.contains("CONFIG_INITRAMFS_SOURCE=") {
                "image+initramfs"
            } else {
                "image"
            };
            write(&source.join("arch/riscv/boot/Image"), image);
            write(&source.join("vmlinux"), image);
        }
    }
}

impl Default for SimulatedTools {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for SimulatedTools {
    fn run(&mut self, command: &ExternalCommand, _log: &Path) -> Result<(), ProcessError> {
        self.commands.push(command.clone());
        if self.fail.as_ref().is_some_and(|f| f(command)) {
            return Err(ProcessError::Failed {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        self.simulate(command);
        Ok(())
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(path, content).expect("Failed to write file");
}
