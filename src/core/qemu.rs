//! QEMU emulator stage
//!
//! A host build: no cross toolchain is involved. Both system emulators are
//! installed to `<workspace>/qemu` regardless of the selected ISA.
//!
//! The built-in `qemu` target keeps its artifacts in the same directory
//! (`<workspace>/qemu/rv32`, `<workspace>/qemu/rv64`); reinstalling the
//! emulator leaves those alone.

use std::path::{Path, PathBuf};

use crate::config::defaults::QEMU_REF;
use crate::config::urls;
use crate::core::component::{Component, StageIo};
use crate::core::context::{BuildContext, Isa};
use crate::core::pipeline::Pipeline;
use crate::core::toolchain::ToolchainKind;
use crate::error::{BuildError, FilesystemError};
use crate::infra::filesystem;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// Emulators built by this stage
pub const SYSTEM_EMULATORS: [&str; 2] = ["qemu-system-riscv32", "qemu-system-riscv64"];

/// The QEMU component
#[derive(Debug, Clone, Copy, Default)]
pub struct Qemu;

impl Component for Qemu {
    fn name(&self) -> &'static str {
        "qemu"
    }

    fn url(&self) -> &'static str {
        urls::QEMU
    }

    fn default_ref(&self) -> &'static str {
        QEMU_REF
    }

    fn toolchain(&self, _isa: Isa) -> Option<ToolchainKind> {
        None
    }

    fn install_dir(&self, ctx: &BuildContext) -> Result<PathBuf, BuildError> {
        Ok(ctx.workspace.emulator_dir())
    }

    fn reset_install_dir(&self, dir: &Path) -> Result<(), FilesystemError> {
        filesystem::create_dir_all(dir)?;
        let entries = std::fs::read_dir(dir).map_err(|e| FilesystemError::ReadFile {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;
        let artifacts = [Isa::Rv32.dir_name(), Isa::Rv64.dir_name()];
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_str().is_some_and(|n| artifacts.contains(&n)) {
                continue;
            }
            let path = entry.path();
            if path.is_dir() && !path.is_symlink() {
                filesystem::remove_dir_all(&path)?;
            } else {
                filesystem::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn configure(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let configure = ExternalCommand::new("./configure")
            .arg(format!("--prefix={}", io.install_dir.display()))
            .arg("--target-list=riscv32-softmmu,riscv64-softmmu")
            .current_dir(&io.source_dir);
        io.run(configure)
    }

    fn build(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let make = io.make();
        io.run(make)
    }

    fn install(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let install = io.make().arg("install");
        io.run(install)?;
        for emulator in SYSTEM_EMULATORS {
            io.require_output(&io.installed(&format!("bin/{emulator}")))?;
        }
        Ok(())
    }
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Build and install the emulator
    pub fn build_qemu(&mut self) -> Result<PathBuf, BuildError> {
        self.run_component(&mut Qemu).map(|out| out.install_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::Settings;
    use crate::core::workspace::LogSession;
    use crate::test_utils::RecordingRunner;
    use tempfile::TempDir;

    #[test]
    fn test_qemu_needs_no_target_or_toolchain() {
        let temp = TempDir::new().unwrap();
        let install = temp.path().join("work/qemu");
        let bin = install.join("bin");
        let runner = RecordingRunner::new().on_success(move |cmd| {
            if cmd.has_arg("install") {
                std::fs::create_dir_all(&bin).unwrap();
                for emulator in SYSTEM_EMULATORS {
                    std::fs::write(bin.join(emulator), "").unwrap();
                }
            }
        });
        let ctx = BuildContext::new(temp.path().join("work"));
        let logs = LogSession::in_dir(temp.path().join("logs"), false).unwrap();
        let mut pipeline =
            Pipeline::new(ctx, Settings::default(), runner, logs, temp.path().join("sources"));

        let installed = pipeline.build_qemu().unwrap();
        assert_eq!(installed, install);

        let commands = pipeline.runner().commands();
        let configure = commands
            .iter()
            .find(|c| c.program == "./configure")
            .unwrap();
        assert!(configure.has_arg("--target-list=riscv32-softmmu,riscv64-softmmu"));
        assert!(!configure.env.contains_key("CROSS_COMPILE"));
    }

    #[test]
    fn test_reinstall_keeps_target_artifacts() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("qemu");
        std::fs::create_dir_all(dir.join("bin")).unwrap();
        std::fs::create_dir_all(dir.join("rv64/linux")).unwrap();
        std::fs::write(dir.join("rv64/linux/Image"), "").unwrap();
        std::fs::write(dir.join("bin/qemu-system-riscv64"), "").unwrap();

        Qemu.reset_install_dir(&dir).unwrap();

        assert!(dir.join("rv64/linux/Image").is_file());
        assert!(!dir.join("bin").exists());
    }
}
