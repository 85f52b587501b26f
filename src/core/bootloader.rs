//! Bootloader stage (BBL from riscv-pk)
//!
//! Built with the newlib toolchain out of tree in `<source>/build`. With a
//! payload request the kernel's `vmlinux` is linked into `bbl`.

use std::path::PathBuf;

use crate::config::defaults::RISCV_PK_REF;
use crate::config::urls;
use crate::core::component::{Component, StageIo};
use crate::core::context::{BuildContext, Isa, StageFlags};
use crate::core::pipeline::Pipeline;
use crate::core::toolchain::ToolchainKind;
use crate::error::BuildError;
use crate::infra::filesystem;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// Stage name and patch prefix of the bootloader
pub const BOOTLOADER_STAGE: &str = "riscv-pk";

/// The riscv-pk component
#[derive(Debug, Clone, Copy, Default)]
pub struct Bootloader {
    /// Link the kernel in as payload
    pub payload: bool,
}

impl Bootloader {
    pub fn new(payload: bool) -> Self {
        Self { payload }
    }

    fn payload_path(ctx: &BuildContext) -> Result<PathBuf, BuildError> {
        Ok(ctx.artifact_dir("linux")?.join("vmlinux"))
    }
}

impl Component for Bootloader {
    fn name(&self) -> &'static str {
        BOOTLOADER_STAGE
    }

    fn url(&self) -> &'static str {
        urls::RISCV_PK
    }

    fn default_ref(&self) -> &'static str {
        RISCV_PK_REF
    }

    fn toolchain(&self, _isa: Isa) -> Option<ToolchainKind> {
        Some(ToolchainKind::Newlib)
    }

    fn patch_prefix(&self) -> Option<&'static str> {
        Some(BOOTLOADER_STAGE)
    }

    fn check_preconditions(&self, ctx: &BuildContext) -> Result<(), BuildError> {
        if self.payload {
            let vmlinux = Self::payload_path(ctx)?;
            if !vmlinux.is_file() {
                return Err(BuildError::precondition(
                    BOOTLOADER_STAGE,
                    format!(
                        "payload requested but {} does not exist (run build_kernel first)",
                        vmlinux.display()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn take_script_requests(&mut self, flags: &mut StageFlags) {
        if flags.embed_payload.take() {
            self.payload = true;
        }
    }

    fn configure(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let build_dir = io.source("build");
        filesystem::recreate_dir(&build_dir)?;

        let mut configure = ExternalCommand::new(io.source("configure").display().to_string())
            .arg(format!("--prefix={}", io.install_dir.display()))
            .arg(format!("--host={}", ToolchainKind::Newlib.triple()))
            .arg(format!("--with-arch={}", io.env.isa.march()))
            .arg(format!("--with-abi={}", io.env.abi))
            .current_dir(&build_dir);
        if self.payload {
            let vmlinux = Self::payload_path(io.ctx)?;
            configure = configure.arg(format!("--with-payload={}", vmlinux.display()));
        }
        io.run(configure)
    }

    fn build(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let make = io.make().arg("bbl").current_dir(io.source("build"));
        io.run(make)
    }

    fn install(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        io.install_file("build/bbl", "bbl")
    }
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Build the bootloader, consuming any payload request
    pub fn build_bootloader(&mut self) -> Result<PathBuf, BuildError> {
        let payload = self.ctx.flags.embed_payload.take();
        self.run_component(&mut Bootloader::new(payload))
            .map(|out| out.install_dir)
    }
}
