//! Build context
//!
//! One [`BuildContext`] exists per run. It is owned by the pipeline and
//! passed by reference into every stage. One-shot requests between stages
//! (embed an initramfs, embed a payload, skip the rootfs image) are
//! [`OneShot`] values: the stage that honors a request takes it, which
//! clears it in the same step.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::workspace::Workspace;
use crate::error::BuildError;

/// Base ISA width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Isa {
    /// RV32
    Rv32,
    /// RV64
    #[default]
    Rv64,
}

impl Isa {
    /// Register width in bits
    pub fn xlen(self) -> u32 {
        match self {
            Self::Rv32 => 32,
            Self::Rv64 => 64,
        }
    }

    /// Directory name used in artifact paths
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Rv32 => "rv32",
            Self::Rv64 => "rv64",
        }
    }

    /// `-march` value for general purpose builds
    pub fn march(self) -> &'static str {
        match self {
            Self::Rv32 => "rv32gc",
            Self::Rv64 => "rv64gc",
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Isa {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "32" | "rv32" => Ok(Self::Rv32),
            "64" | "rv64" => Ok(Self::Rv64),
            other => Err(format!("invalid ISA width '{other}' (expected 32 or 64)")),
        }
    }
}

/// Calling convention / data model
///
/// Stages derive the ABI they need from the ISA width themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abi {
    Ilp32,
    Lp64,
}

impl Abi {
    /// Integer-only ABI for the width
    pub fn soft_float(isa: Isa) -> Self {
        match isa {
            Isa::Rv32 => Self::Ilp32,
            Isa::Rv64 => Self::Lp64,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ilp32 => "ilp32",
            Self::Lp64 => "lp64",
        }
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that is honored at most once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneShot(bool);

impl OneShot {
    /// Raise the request
    pub fn arm(&mut self) {
        self.0 = true;
    }

    /// Consume the request, leaving it cleared
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.0)
    }

    /// Whether the request is pending
    pub fn is_armed(self) -> bool {
        self.0
    }
}

/// Pending one-shot requests between stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageFlags {
    /// Kernel: rebuild with a rootfs tree built in
    pub embed_initramfs: OneShot,
    /// Bootloader/firmware: link the kernel in as payload
    pub embed_payload: OneShot,
    /// Rootfs: keep the directory tree, do not pack an image
    pub skip_rootfs_image: OneShot,
}

/// The resolved target of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    /// Target identifier
    pub name: String,
    /// Ordered patches for this target
    pub patch_dir: PathBuf,
    /// Pre-built per-component configuration files
    pub config_dir: PathBuf,
}

/// State threaded through every stage of a run
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// ISA width
    pub isa: Isa,
    /// Active target, if the command is target-scoped
    pub target: Option<TargetInfo>,
    /// Output layout
    pub workspace: Workspace,
    /// Pending one-shot requests
    pub flags: StageFlags,
    /// OpenSBI platform identifier
    pub firmware_platform: Option<String>,
    /// Re-clone every source instead of refreshing
    pub force_refetch: bool,
    /// Debug diagnostics and log retention
    pub verbose: bool,
    /// Parallel jobs handed to external build systems
    pub jobs: usize,
}

impl BuildContext {
    /// Create a context for a workspace root with default settings
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            isa: Isa::default(),
            target: None,
            workspace: Workspace::new(workspace_root),
            flags: StageFlags::default(),
            firmware_platform: None,
            force_refetch: false,
            verbose: false,
            jobs: num_cpus::get(),
        }
    }

    /// Set the ISA width
    #[must_use]
    pub fn with_isa(mut self, isa: Isa) -> Self {
        self.isa = isa;
        self
    }

    /// Set the number of parallel jobs
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Name of the active target
    pub fn target_name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.name.as_str())
    }

    /// Artifact directory of a component for the active target and ISA
    pub fn artifact_dir(&self, component: &str) -> Result<PathBuf, BuildError> {
        let target = self.target_name().ok_or_else(|| {
            BuildError::precondition(component, "no target selected for a target-scoped stage")
        })?;
        Ok(self.workspace.artifact_dir(target, self.isa, component))
    }

    /// Variables describing the context to patch scripts
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("RVFORGE_ISA".to_string(), self.isa.xlen().to_string());
        env.insert(
            "RVFORGE_WORKSPACE".to_string(),
            self.workspace.root().display().to_string(),
        );
        env.insert("RVFORGE_JOBS".to_string(), self.jobs.to_string());
        if let Some(target) = &self.target {
            env.insert("RVFORGE_TARGET".to_string(), target.name.clone());
        }
        if let Some(platform) = &self.firmware_platform {
            env.insert("RVFORGE_FIRMWARE_PLATFORM".to_string(), platform.clone());
        }
        env
    }

    /// Apply one `KEY=VALUE` change requested by a patch script
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "ISA" => self.isa = value.parse()?,
            "FIRMWARE_PLATFORM" => {
                self.firmware_platform = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            "EMBED_INITRAMFS" => set_flag(&mut self.flags.embed_initramfs, value)?,
            "EMBED_PAYLOAD" => set_flag(&mut self.flags.embed_payload, value)?,
            "SKIP_ROOTFS_IMAGE" => set_flag(&mut self.flags.skip_rootfs_image, value)?,
            other => return Err(format!("unknown context key '{other}'")),
        }
        Ok(())
    }
}

fn set_flag(flag: &mut OneShot, value: &str) -> Result<(), String> {
    match value {
        "1" | "y" | "yes" | "true" => flag.arm(),
        "0" | "n" | "no" | "false" => {
            flag.take();
        }
        other => return Err(format!("invalid flag value '{other}'")),
    }
    Ok(())
}
