//! Linux kernel stage
//!
//! The kernel is built with the glibc toolchain and installed as `Image`,
//! `vmlinux`, `config` and `lib/modules` under the target's artifact
//! directory.
//!
//! # Self-embedding
//!
//! When an initramfs is requested the kernel is built twice, driven by
//! [`KernelPhase`]:
//!
//! ```text
//! PlainBuild -> EmbedPrepare -> Rebuild -> Done
//!      \______________________________/^
//!           (no initramfs requested)
//! ```
//!
//! The first image provides the modules the root filesystem needs; the root
//! filesystem tree is then linked into the second image.

use std::path::{Path, PathBuf};

use crate::config::defaults::LINUX_REF;
use crate::config::urls;
use crate::core::build_env::BuildEnvironment;
use crate::core::component::{Component, StageIo, StageOutput};
use crate::core::context::Isa;
use crate::core::kconfig::ConfigTemplate;
use crate::core::pipeline::Pipeline;
use crate::core::rootfs::RootfsOutput;
use crate::core::toolchain::ToolchainKind;
use crate::error::BuildError;
use crate::infra::filesystem;
use crate::infra::process::ProcessRunner;

/// Stage name and patch prefix of the kernel
pub const KERNEL_STAGE: &str = "linux";

/// Kernel image inside the source tree
const BOOT_IMAGE: &str = "arch/riscv/boot/Image";

/// The Linux component
#[derive(Debug, Clone, Copy, Default)]
pub struct Linux;

impl Component for Linux {
    fn name(&self) -> &'static str {
        KERNEL_STAGE
    }

    fn url(&self) -> &'static str {
        urls::LINUX
    }

    fn default_ref(&self) -> &'static str {
        LINUX_REF
    }

    fn toolchain(&self, _isa: Isa) -> Option<ToolchainKind> {
        Some(ToolchainKind::Glibc)
    }

    fn patch_prefix(&self) -> Option<&'static str> {
        Some(KERNEL_STAGE)
    }

    fn configure(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let dot_config = io.source(".config");

        if let Some(template) = io.target_config() {
            io.render_config(&template, &dot_config)?;
        } else {
            let defconfig = io.kbuild().arg("defconfig");
            io.run(defconfig)?;

            if io.env.isa == Isa::Rv32 {
                let mut config = ConfigTemplate::load(&dot_config)?;
                config.set_symbol("ARCH_RV32I", "y");
                config.disable("ARCH_RV64I");
                config.write(&dot_config)?;
            }
        }

        let olddefconfig = io.kbuild().arg("olddefconfig");
        io.run(olddefconfig)
    }

    fn build(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let make = io.kbuild().arg(io.env.jobs_arg());
        io.run(make)
    }

    fn install(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        io.install_file(BOOT_IMAGE, "Image")?;
        io.install_file("vmlinux", "vmlinux")?;
        io.install_file(".config", "config")?;

        let modules = io.installed("lib/modules");
        let config = ConfigTemplate::load(&io.source(".config"))?;
        if config.is_enabled("MODULES") {
            let install = io
                .kbuild()
                .arg(format!("INSTALL_MOD_PATH={}", io.install_dir.display()))
                .arg("modules_install");
            io.run(install)?;
            io.require_output(&modules)
        } else {
            filesystem::create_dir_all(&modules)?;
            Ok(())
        }
    }
}

/// Step of the two-pass kernel build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelPhase {
    /// Build and install the kernel once
    PlainBuild,
    /// Build the root filesystem tree against the first kernel
    EmbedPrepare { kernel: StageOutput },
    /// Rebuild the kernel with the tree as its initramfs
    Rebuild {
        kernel: StageOutput,
        initramfs: PathBuf,
    },
    /// Finished
    Done {
        kernel: StageOutput,
        initramfs: Option<PathBuf>,
    },
}

impl KernelPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlainBuild => "plain-build",
            Self::EmbedPrepare { .. } => "embed-prepare",
            Self::Rebuild { .. } => "rebuild",
            Self::Done { .. } => "done",
        }
    }
}

/// Result of a kernel build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelOutcome {
    /// Phases visited, in order
    pub phases: Vec<&'static str>,
    /// Installed kernel image
    pub image: PathBuf,
    /// Root filesystem tree linked into the image, if any
    pub initramfs: Option<PathBuf>,
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Build the kernel, embedding a root filesystem when requested
    ///
    /// The initramfs request is consumed on entry, whether or not the build
    /// succeeds.
    pub fn build_kernel(&mut self) -> Result<KernelOutcome, BuildError> {
        let embed = self.ctx.flags.embed_initramfs.take();
        let mut phases = Vec::new();
        let mut phase = KernelPhase::PlainBuild;

        let (kernel, initramfs) = loop {
            phases.push(phase.name());
            phase = match phase {
                KernelPhase::PlainBuild => {
                    let kernel = self.run_component(&mut Linux)?;
                    // A linux patch script may have asked for the embed itself.
                    let requested = self.ctx.flags.embed_initramfs.take();
                    if embed || requested {
                        KernelPhase::EmbedPrepare { kernel }
                    } else {
                        KernelPhase::Done {
                            kernel,
                            initramfs: None,
                        }
                    }
                }
                KernelPhase::EmbedPrepare { kernel } => {
                    self.ctx.flags.skip_rootfs_image.arm();
                    match self.build_rootfs()? {
                        RootfsOutput::Tree(initramfs) => KernelPhase::Rebuild { kernel, initramfs },
                        RootfsOutput::Image(image) => {
                            return Err(BuildError::precondition(
                                KERNEL_STAGE,
                                format!(
                                    "root filesystem was packed into {} instead of left as a tree",
                                    image.display()
                                ),
                            ));
                        }
                    }
                }
                KernelPhase::Rebuild { kernel, initramfs } => {
                    self.rebuild_with_initramfs(&kernel, &initramfs)?;
                    KernelPhase::Done {
                        kernel,
                        initramfs: Some(initramfs),
                    }
                }
                KernelPhase::Done { kernel, initramfs } => break (kernel, initramfs),
            };
        };

        Ok(KernelOutcome {
            phases,
            image: kernel.install_dir.join("Image"),
            initramfs,
        })
    }

    /// Second pass: link `tree` into the kernel and reinstall it
    fn rebuild_with_initramfs(
        &mut self,
        kernel: &StageOutput,
        tree: &Path,
    ) -> Result<(), BuildError> {
        let log = self.open_log(KERNEL_STAGE)?;
        tracing::info!("Rebuilding {KERNEL_STAGE} with initramfs {}", tree.display());

        let isa = self.ctx.isa;
        let toolchain_dir = self.require_toolchain(KERNEL_STAGE, ToolchainKind::Glibc)?;
        let env = BuildEnvironment::for_cross(
            ToolchainKind::Glibc,
            &toolchain_dir,
            isa,
            Linux.abi(isa),
            kernel.install_dir.clone(),
        )
        .with_jobs(self.ctx.jobs);
        let mut io = StageIo::new(
            KERNEL_STAGE,
            &self.ctx,
            &mut self.runner,
            log,
            kernel.source_dir.clone(),
            kernel.install_dir.clone(),
            env,
        );

        let dot_config = io.source(".config");
        let mut config = ConfigTemplate::load(&dot_config)?;
        config.set_symbol("BLK_DEV_INITRD", "y");
        config.set_string("INITRAMFS_SOURCE", &tree.display().to_string());
        config.set_symbol("INITRAMFS_COMPRESSION_GZIP", "y");
        config.write(&dot_config)?;
        let olddefconfig = io.kbuild().arg("olddefconfig");
        io.run(olddefconfig)?;

        remove_first_pass_images(&io.source_dir)?;
        Linux.build(&mut io)?;
        filesystem::recreate_dir(&io.install_dir)?;
        Linux.install(&mut io)?;

        tracing::info!("{KERNEL_STAGE} with initramfs installed to {}", io.install_dir.display());
        Ok(())
    }
}

/// Delete `arch/riscv/boot/Image*` and `vmlinux` so the rebuild cannot reuse them
fn remove_first_pass_images(source_dir: &Path) -> Result<(), BuildError> {
    let boot = source_dir.join("arch/riscv/boot");
    if let Ok(entries) = std::fs::read_dir(&boot) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with("Image") {
                filesystem::remove_file(&entry.path())?;
            }
        }
    }
    filesystem::remove_file(&source_dir.join("vmlinux"))?;
    Ok(())
}
