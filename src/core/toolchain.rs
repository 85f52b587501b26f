//! Cross toolchain builds
//!
//! Builds one of the four riscv-gnu-toolchain variants into
//! `<workspace>/riscv-<type>-toolchain`. Every build starts from a clean
//! out-of-tree build directory and an empty install directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::defaults::{MUSL_REF, TOOLCHAIN_REF};
use crate::config::urls;
use crate::core::context::Isa;
use crate::core::pipeline::Pipeline;
use crate::error::BuildError;
use crate::infra::filesystem;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// Source cache entry of the toolchain build system
pub const TOOLCHAIN_SOURCE: &str = "riscv-gnu-toolchain";

/// Source cache entry of the musl libc tree
pub const MUSL_SOURCE: &str = "musl";

/// Toolchain variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolchainKind {
    /// Bare-metal, newlib C library
    Newlib,
    /// Linux userspace and kernel, glibc
    Glibc,
    /// 32-bit Linux userspace, musl
    Musl32,
    /// 64-bit Linux userspace, musl
    Musl64,
}

impl ToolchainKind {
    /// All variants, in bootstrap order
    pub const ALL: [Self; 4] = [Self::Newlib, Self::Glibc, Self::Musl32, Self::Musl64];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Newlib => "newlib",
            Self::Glibc => "glibc",
            Self::Musl32 => "musl32",
            Self::Musl64 => "musl64",
        }
    }

    /// The musl variant matching an ISA width
    pub fn musl_for(isa: Isa) -> Self {
        match isa {
            Isa::Rv32 => Self::Musl32,
            Isa::Rv64 => Self::Musl64,
        }
    }

    pub fn is_musl(self) -> bool {
        matches!(self, Self::Musl32 | Self::Musl64)
    }

    /// Make target of riscv-gnu-toolchain that builds this variant
    pub fn make_target(self) -> &'static str {
        match self {
            Self::Newlib => "newlib",
            Self::Glibc => "linux",
            Self::Musl32 | Self::Musl64 => "musl",
        }
    }

    /// Target triple of the installed tools
    pub fn triple(self) -> &'static str {
        match self {
            Self::Newlib => "riscv64-unknown-elf",
            Self::Glibc => "riscv64-unknown-linux-gnu",
            Self::Musl32 => "riscv32-unknown-linux-musl",
            Self::Musl64 => "riscv64-unknown-linux-musl",
        }
    }

    /// Tool name prefix, as passed in `CROSS_COMPILE`
    pub fn cross_prefix(self) -> String {
        format!("{}-", self.triple())
    }

    /// Extra configure options
    pub fn configure_args(self) -> &'static [&'static str] {
        match self {
            Self::Newlib | Self::Glibc => &["--enable-multilib"],
            Self::Musl32 => &["--with-arch=rv32gc", "--with-abi=ilp32"],
            Self::Musl64 => &["--with-arch=rv64gc", "--with-abi=lp64"],
        }
    }

    /// Log name of the stage building this variant
    pub fn stage_name(self) -> &'static str {
        match self {
            Self::Newlib => "toolchain-newlib",
            Self::Glibc => "toolchain-glibc",
            Self::Musl32 => "toolchain-musl32",
            Self::Musl64 => "toolchain-musl64",
        }
    }

    /// Compiler driver that must exist after a successful build
    pub fn gcc_path(self, install_dir: &Path) -> PathBuf {
        install_dir
            .join("bin")
            .join(format!("{}-gcc", self.triple()))
    }
}

impl fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolchainKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                BuildError::precondition(
                    "toolchain",
                    format!("unknown toolchain type '{s}' (expected newlib, glibc, musl32 or musl64)"),
                )
            })
    }
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Build a toolchain variant and return its install directory
    pub fn build_toolchain(&mut self, kind: ToolchainKind) -> Result<PathBuf, BuildError> {
        let stage = kind.stage_name();
        let log = self.open_log(stage)?;
        tracing::info!("Building {kind} toolchain");

        let source = self.fetch_source(
            stage,
            TOOLCHAIN_SOURCE,
            urls::RISCV_GNU_TOOLCHAIN,
            TOOLCHAIN_REF,
            &log,
        )?;
        let musl = if kind.is_musl() {
            Some(self.fetch_source(stage, MUSL_SOURCE, urls::MUSL, MUSL_REF, &log)?)
        } else {
            None
        };

        let build_dir = source.join(format!("build-{kind}"));
        filesystem::recreate_dir(&build_dir)?;
        let install_dir = self.ctx.workspace.toolchain_dir(kind);
        filesystem::remove_dir_all(&install_dir)?;

        let mut configure = ExternalCommand::new(source.join("configure").display().to_string())
            .arg(format!("--prefix={}", install_dir.display()))
            .args(kind.configure_args().iter().copied())
            .current_dir(&build_dir);
        if let Some(musl) = &musl {
            configure = configure.arg(format!("--with-musl-src={}", musl.display()));
        }
        self.run_logged(stage, &configure, &log)?;

        let make = ExternalCommand::new("make")
            .arg(format!("-j{}", self.ctx.jobs))
            .arg(kind.make_target())
            .current_dir(&build_dir);
        self.run_logged(stage, &make, &log)?;

        let gcc = kind.gcc_path(&install_dir);
        if !gcc.is_file() {
            return Err(BuildError::ExternalTool {
                stage: stage.to_string(),
                error: format!("expected compiler '{}' was not installed", gcc.display()),
                log,
            });
        }

        tracing::info!("{kind} toolchain installed to {}", install_dir.display());
        Ok(install_dir)
    }
}
