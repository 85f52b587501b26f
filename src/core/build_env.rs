//! Build environment setup
//!
//! Describes how an external build system is invoked for one stage: the
//! cross tool prefix, the toolchain `bin/` directory prepended to `PATH`,
//! the ISA/ABI pair and the install prefix. The same values feed the
//! `@NAME@` placeholders of target config templates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::context::{Abi, Isa};
use crate::core::toolchain::ToolchainKind;

/// Kernel architecture name for every RISC-V build
pub const KERNEL_ARCH: &str = "riscv";

/// Build environment for a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    /// Toolchain used, `None` for host builds
    pub toolchain: Option<ToolchainKind>,
    /// `bin/` directory of the toolchain install
    pub toolchain_bin: Option<PathBuf>,
    /// ISA width the stage targets
    pub isa: Isa,
    /// ABI the stage targets
    pub abi: Abi,
    /// Install directory of the stage
    pub prefix: PathBuf,
    /// Number of parallel jobs
    pub jobs: usize,
}

impl BuildEnvironment {
    /// Environment for a native build (the emulator)
    pub fn for_host(isa: Isa, prefix: PathBuf) -> Self {
        Self {
            toolchain: None,
            toolchain_bin: None,
            isa,
            abi: Abi::soft_float(isa),
            prefix,
            jobs: num_cpus::get(),
        }
    }

    /// Environment for a cross build with an installed toolchain
    pub fn for_cross(
        toolchain: ToolchainKind,
        toolchain_dir: &Path,
        isa: Isa,
        abi: Abi,
        prefix: PathBuf,
    ) -> Self {
        Self {
            toolchain: Some(toolchain),
            toolchain_bin: Some(toolchain_dir.join("bin")),
            isa,
            abi,
            prefix,
            jobs: num_cpus::get(),
        }
    }

    /// Set the number of parallel jobs
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Cross tool prefix, empty for host builds
    pub fn cross_compile(&self) -> String {
        self.toolchain
            .map(ToolchainKind::cross_prefix)
            .unwrap_or_default()
    }

    /// `-j<n>` argument for make
    pub fn jobs_arg(&self) -> String {
        format!("-j{}", self.jobs)
    }

    /// `ARCH=` and `CROSS_COMPILE=` make variables, as Kbuild expects them
    pub fn kbuild_vars(&self) -> [String; 2] {
        [
            format!("ARCH={KERNEL_ARCH}"),
            format!("CROSS_COMPILE={}", self.cross_compile()),
        ]
    }

    /// Convert to environment variable map for process execution
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        if let Some(bin) = &self.toolchain_bin {
            env.insert("PATH".to_string(), prepend_path(bin));
            env.insert("CROSS_COMPILE".to_string(), self.cross_compile());
        }

        env
    }

    /// Values for the `@NAME@` placeholders of config templates
    pub fn substitutions(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("ARCH", KERNEL_ARCH.to_string()),
            ("MARCH", self.isa.march().to_string()),
            ("MABI", self.abi.to_string()),
            ("CROSS_COMPILE", self.cross_compile()),
            ("XLEN", self.isa.xlen().to_string()),
            ("PREFIX", self.prefix.display().to_string()),
        ])
    }
}

/// `PATH` with `dir` in front of the inherited search path
fn prepend_path(dir: &Path) -> String {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let paths = std::iter::once(dir.to_path_buf()).chain(std::env::split_paths(&inherited));
    match std::env::join_paths(paths) {
        Ok(joined) => joined.to_string_lossy().into_owned(),
        Err(_) => dir.display().to_string(),
    }
}
