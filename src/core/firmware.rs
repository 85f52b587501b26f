//! Firmware stage (OpenSBI)
//!
//! Built with the newlib toolchain for the target's firmware platform. All
//! `fw_*.bin` and `fw_*.elf` images of the platform are installed; with a
//! payload request the kernel `Image` is linked into `fw_payload`.

use std::path::PathBuf;

use crate::config::defaults::OPENSBI_REF;
use crate::config::urls;
use crate::core::component::{Component, StageIo};
use crate::core::context::{BuildContext, Isa};
use crate::core::pipeline::Pipeline;
use crate::core::toolchain::ToolchainKind;
use crate::error::BuildError;
use crate::infra::filesystem;
use crate::infra::process::ProcessRunner;

/// Stage name of the firmware
pub const FIRMWARE_STAGE: &str = "opensbi";

/// The OpenSBI component
#[derive(Debug, Clone, Copy, Default)]
pub struct Firmware {
    /// Link the kernel in as payload
    pub payload: bool,
}

impl Firmware {
    pub fn new(payload: bool) -> Self {
        Self { payload }
    }

    fn payload_path(ctx: &BuildContext) -> Result<PathBuf, BuildError> {
        Ok(ctx.artifact_dir("linux")?.join("Image"))
    }

    fn platform(ctx: &BuildContext) -> Result<&str, BuildError> {
        ctx.firmware_platform.as_deref().ok_or_else(|| {
            BuildError::precondition(
                FIRMWARE_STAGE,
                "no firmware platform set for this target",
            )
        })
    }
}

impl Component for Firmware {
    fn name(&self) -> &'static str {
        FIRMWARE_STAGE
    }

    fn url(&self) -> &'static str {
        urls::OPENSBI
    }

    fn default_ref(&self) -> &'static str {
        OPENSBI_REF
    }

    fn toolchain(&self, _isa: Isa) -> Option<ToolchainKind> {
        Some(ToolchainKind::Newlib)
    }

    fn check_preconditions(&self, ctx: &BuildContext) -> Result<(), BuildError> {
        Self::platform(ctx)?;
        if self.payload {
            let image = Self::payload_path(ctx)?;
            if !image.is_file() {
                return Err(BuildError::precondition(
                    FIRMWARE_STAGE,
                    format!(
                        "payload requested but {} does not exist (run build_kernel first)",
                        image.display()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn configure(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        filesystem::recreate_dir(&io.source("build"))?;
        Ok(())
    }

    fn build(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let platform = Self::platform(io.ctx)?;
        let mut make = io
            .make()
            .arg(format!("CROSS_COMPILE={}", io.env.cross_compile()))
            .arg(format!("PLATFORM={platform}"))
            .arg(format!("PLATFORM_RISCV_XLEN={}", io.env.isa.xlen()))
            .arg(format!("O={}", io.source("build").display()));
        if self.payload {
            let image = Self::payload_path(io.ctx)?;
            make = make.arg(format!("FW_PAYLOAD_PATH={}", image.display()));
        }
        io.run(make)
    }

    fn install(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let platform = Self::platform(io.ctx)?;
        let firmware_dir = io.source(&format!("build/platform/{platform}/firmware"));
        io.require_output(&firmware_dir)?;

        let entries = std::fs::read_dir(&firmware_dir).map_err(|e| BuildError::ExternalTool {
            stage: FIRMWARE_STAGE.to_string(),
            error: format!("cannot list {}: {e}", firmware_dir.display()),
            log: io.log.clone(),
        })?;

        let mut installed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_image = name.ends_with(".bin") || name.ends_with(".elf");
            if name.starts_with("fw_") && is_image {
                filesystem::copy_file(&entry.path(), &io.installed(&name))?;
                installed += 1;
            }
        }
        tracing::debug!("Installed {installed} firmware image(s)");

        if self.payload {
            return io.require_output(&io.installed("fw_payload.elf"));
        }
        if installed == 0 {
            return io.require_output(&io.installed("fw_dynamic.bin"));
        }
        Ok(())
    }
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Build the firmware, consuming any payload request
    pub fn build_firmware(&mut self) -> Result<PathBuf, BuildError> {
        let payload = self.ctx.flags.embed_payload.take();
        self.run_component(&mut Firmware::new(payload))
            .map(|out| out.install_dir)
    }
}
