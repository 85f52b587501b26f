//! Targets and their command sets
//!
//! A [`Target`] validates a command line, prepares the [`BuildContext`] and
//! turns the command into [`Step`]s for a [`StepExecutor`]. The `qemu`
//! target is built in; further targets are declared in
//! `<targets_dir>/<name>/target.toml`:
//!
//! ```toml
//! description = "SiFive HiFive Unleashed"
//! isa = 64
//! firmware_platform = "generic"
//! bootstrap = ["toolchain:newlib", "toolchain:glibc", "toolchain:musl64", "qemu"]
//!
//! [commands]
//! build_all = ["kernel:initramfs", "firmware:payload"]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::defaults::DEFAULT_FIRMWARE_PLATFORM;
use crate::core::context::{BuildContext, Isa, TargetInfo};
use crate::core::toolchain::ToolchainKind;
use crate::error::BuildError;

/// Manifest file name inside a target directory
pub const MANIFEST_FILE: &str = "target.toml";

/// Name of the built-in target
pub const BUILTIN_QEMU: &str = "qemu";

/// Commands every target understands, with their optional argument
pub const STANDARD_COMMANDS: [(&str, Option<&str>); 7] = [
    ("bootstrap", None),
    ("build_kernel", Some("initramfs")),
    ("build_rootfs", Some("noimage")),
    ("build_bootloader", Some("payload")),
    ("build_firmware", Some("payload")),
    ("build_busybox", None),
    ("build_dropbear", None),
];

/// Target manifest errors
#[derive(Error, Debug)]
pub enum TargetError {
    /// Failed to read the manifest
    #[error("Failed to read target manifest '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// Failed to parse the manifest
    #[error("Failed to parse target manifest '{path}': {error}")]
    ParseError { path: PathBuf, error: String },

    /// The manifest parsed but describes something invalid
    #[error("Invalid target manifest '{path}': {error}")]
    Invalid { path: PathBuf, error: String },
}

/// One unit of work in a command sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Toolchain(ToolchainKind),
    Qemu,
    Kernel { initramfs: bool },
    Rootfs { noimage: bool },
    Bootloader { payload: bool },
    Firmware { payload: bool },
    Busybox,
    Dropbear,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let with = |f: &mut fmt::Formatter<'_>, name: &str, flag: bool, arg: &str| {
            if flag {
                write!(f, "{name}:{arg}")
            } else {
                f.write_str(name)
            }
        };
        match *self {
            Self::Toolchain(kind) => write!(f, "toolchain:{kind}"),
            Self::Qemu => f.write_str("qemu"),
            Self::Kernel { initramfs } => with(f, "kernel", initramfs, "initramfs"),
            Self::Rootfs { noimage } => with(f, "rootfs", noimage, "noimage"),
            Self::Bootloader { payload } => with(f, "bootloader", payload, "payload"),
            Self::Firmware { payload } => with(f, "firmware", payload, "payload"),
            Self::Busybox => f.write_str("busybox"),
            Self::Dropbear => f.write_str("dropbear"),
        }
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let flag = |expected: &str| match arg {
            None => Ok(false),
            Some(a) if a == expected => Ok(true),
            Some(a) => Err(format!("step '{name}' does not accept '{a}'")),
        };
        let bare = |step: Self| match arg {
            None => Ok(step),
            Some(a) => Err(format!("step '{name}' does not accept '{a}'")),
        };

        match name {
            "toolchain" => {
                let kind = arg.ok_or_else(|| "step 'toolchain' needs a type".to_string())?;
                kind.parse().map(Self::Toolchain).map_err(|e: BuildError| e.to_string())
            }
            "qemu" => bare(Self::Qemu),
            "kernel" => flag("initramfs").map(|initramfs| Self::Kernel { initramfs }),
            "rootfs" => flag("noimage").map(|noimage| Self::Rootfs { noimage }),
            "bootloader" => flag("payload").map(|payload| Self::Bootloader { payload }),
            "firmware" => flag("payload").map(|payload| Self::Firmware { payload }),
            "busybox" => bare(Self::Busybox),
            "dropbear" => bare(Self::Dropbear),
            other => Err(format!("unknown step '{other}'")),
        }
    }
}

/// Something that can run steps; implemented by the pipeline
pub trait StepExecutor {
    /// Run one step
    fn run_step(&mut self, step: &Step) -> Result<(), BuildError>;

    /// Build every toolchain and the emulator
    fn bootstrap_generic(&mut self) -> Result<(), BuildError>;
}

/// A validated command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run the target's bootstrap hook
    Bootstrap,
    /// Run these steps in order
    Steps(Vec<Step>),
}

/// Parse one of the commands every target supports
///
/// Returns `None` when `command` is not a standard command.
pub fn standard_invocation(
    command: &str,
    args: &[String],
) -> Option<Result<Invocation, BuildError>> {
    let (_, accepted) = STANDARD_COMMANDS.iter().find(|(name, _)| *name == command)?;

    let flag = match (args, accepted) {
        ([], _) => false,
        ([arg], Some(expected)) if arg == expected => true,
        _ => {
            let usage = match accepted {
                Some(arg) => format!("usage: {command} [{arg}]"),
                None => format!("usage: {command}"),
            };
            return Some(Err(BuildError::usage(format!(
                "invalid arguments '{}' for {command} ({usage})",
                args.join(" ")
            ))));
        }
    };

    let step = match command {
        "bootstrap" => return Some(Ok(Invocation::Bootstrap)),
        "build_kernel" => Step::Kernel { initramfs: flag },
        "build_rootfs" => Step::Rootfs { noimage: flag },
        "build_bootloader" => Step::Bootloader { payload: flag },
        "build_firmware" => Step::Firmware { payload: flag },
        "build_busybox" => Step::Busybox,
        _ => Step::Dropbear,
    };
    Some(Ok(Invocation::Steps(vec![step])))
}

/// Per-target behavior
pub trait Target {
    /// Target identifier
    fn name(&self) -> &str;

    /// One-line description for help output
    fn description(&self) -> &str;

    /// Directory holding `patches/` and `configs/`
    fn dir(&self) -> &Path;

    /// Commands beyond the standard set
    fn extra_commands(&self) -> Vec<String> {
        Vec::new()
    }

    /// Check a command line before any work starts
    fn validate_arguments(&self, command: &str, args: &[String]) -> Result<Invocation, BuildError> {
        standard_invocation(command, args).unwrap_or_else(|| {
            Err(BuildError::usage(format!(
                "target '{}' has no command '{command}'",
                self.name()
            )))
        })
    }

    /// Point the context at this target
    fn prepare_environment(&self, ctx: &mut BuildContext) -> Result<(), BuildError> {
        ctx.target = Some(TargetInfo {
            name: self.name().to_string(),
            patch_dir: self.dir().join("patches"),
            config_dir: self.dir().join("configs"),
        });
        Ok(())
    }

    /// Build everything this target needs before its first stage
    fn bootstrap(&self, exec: &mut dyn StepExecutor) -> Result<(), BuildError> {
        exec.bootstrap_generic()
    }

    /// Run a validated command
    fn run_command(
        &self,
        exec: &mut dyn StepExecutor,
        invocation: &Invocation,
    ) -> Result<(), BuildError> {
        match invocation {
            Invocation::Bootstrap => self.bootstrap(exec),
            Invocation::Steps(steps) => {
                for step in steps {
                    exec.run_step(step)?;
                }
                Ok(())
            }
        }
    }
}

/// The built-in QEMU `virt` target
#[derive(Debug, Clone)]
pub struct QemuTarget {
    dir: PathBuf,
}

impl QemuTarget {
    /// Create the target, looking for patches and configs under `targets_dir`
    pub fn new(targets_dir: &Path) -> Self {
        Self {
            dir: targets_dir.join(BUILTIN_QEMU),
        }
    }
}

impl Target for QemuTarget {
    fn name(&self) -> &str {
        BUILTIN_QEMU
    }

    fn description(&self) -> &str {
        "QEMU virt machine"
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn prepare_environment(&self, ctx: &mut BuildContext) -> Result<(), BuildError> {
        ctx.target = Some(TargetInfo {
            name: BUILTIN_QEMU.to_string(),
            patch_dir: self.dir.join("patches"),
            config_dir: self.dir.join("configs"),
        });
        ctx.firmware_platform = Some(DEFAULT_FIRMWARE_PLATFORM.to_string());
        Ok(())
    }
}

/// Contents of a `target.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetManifest {
    /// One-line description
    #[serde(default)]
    pub description: String,

    /// Forced ISA width (32 or 64)
    #[serde(default)]
    pub isa: Option<u32>,

    /// OpenSBI platform
    #[serde(default)]
    pub firmware_platform: Option<String>,

    /// Steps replacing the generic bootstrap
    #[serde(default)]
    pub bootstrap: Option<Vec<String>>,

    /// Named step sequences
    #[serde(default)]
    pub commands: BTreeMap<String, Vec<String>>,
}

impl TargetManifest {
    /// Parse manifest TOML
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// A target declared by a manifest
#[derive(Debug, Clone)]
pub struct ManifestTarget {
    name: String,
    dir: PathBuf,
    description: String,
    isa: Option<Isa>,
    firmware_platform: Option<String>,
    bootstrap: Option<Vec<Step>>,
    commands: BTreeMap<String, Vec<Step>>,
}

impl ManifestTarget {
    /// Load `<dir>/target.toml`; the target takes the directory's name
    pub fn load(name: &str, dir: &Path) -> Result<Self, TargetError> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| TargetError::ReadError {
            path: path.clone(),
            error: e.to_string(),
        })?;
        let manifest = TargetManifest::from_toml(&content).map_err(|e| TargetError::ParseError {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Self::from_manifest(name, dir, manifest).map_err(|error| TargetError::Invalid { path, error })
    }

    fn from_manifest(name: &str, dir: &Path, manifest: TargetManifest) -> Result<Self, String> {
        let isa = manifest
            .isa
            .map(|width| width.to_string().parse::<Isa>())
            .transpose()?;

        let parse_steps = |steps: &[String]| -> Result<Vec<Step>, String> {
            steps.iter().map(|s| s.parse()).collect()
        };
        let bootstrap = manifest.bootstrap.as_deref().map(parse_steps).transpose()?;

        let mut commands = BTreeMap::new();
        for (command, steps) in &manifest.commands {
            if STANDARD_COMMANDS.iter().any(|(name, _)| name == command) {
                return Err(format!("command '{command}' shadows a standard command"));
            }
            if steps.is_empty() {
                return Err(format!("command '{command}' has no steps"));
            }
            let steps = parse_steps(steps).map_err(|e| format!("command '{command}': {e}"))?;
            commands.insert(command.clone(), steps);
        }

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            description: manifest.description,
            isa,
            firmware_platform: manifest.firmware_platform,
            bootstrap,
            commands,
        })
    }
}

impl Target for ManifestTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn extra_commands(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    fn validate_arguments(&self, command: &str, args: &[String]) -> Result<Invocation, BuildError> {
        if let Some(steps) = self.commands.get(command) {
            if !args.is_empty() {
                return Err(BuildError::usage(format!(
                    "command '{command}' takes no arguments"
                )));
            }
            return Ok(Invocation::Steps(steps.clone()));
        }
        standard_invocation(command, args).unwrap_or_else(|| {
            Err(BuildError::usage(format!(
                "target '{}' has no command '{command}'",
                self.name
            )))
        })
    }

    fn prepare_environment(&self, ctx: &mut BuildContext) -> Result<(), BuildError> {
        ctx.target = Some(TargetInfo {
            name: self.name.clone(),
            patch_dir: self.dir.join("patches"),
            config_dir: self.dir.join("configs"),
        });
        if let Some(isa) = self.isa {
            ctx.isa = isa;
        }
        ctx.firmware_platform = self.firmware_platform.clone();
        Ok(())
    }

    fn bootstrap(&self, exec: &mut dyn StepExecutor) -> Result<(), BuildError> {
        let Some(steps) = &self.bootstrap else {
            return exec.bootstrap_generic();
        };
        for step in steps {
            exec.run_step(step)?;
        }
        Ok(())
    }
}

/// Resolves target names
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets_dir: PathBuf,
}

impl TargetRegistry {
    pub fn new(targets_dir: PathBuf) -> Self {
        Self { targets_dir }
    }

    pub fn targets_dir(&self) -> &Path {
        &self.targets_dir
    }

    /// Look up a target by name
    ///
    /// A manifest takes precedence over the built-in target of the same name.
    /// Unknown names are usage errors.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Target>, BuildError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(BuildError::usage(format!("unknown target '{name}'")));
        }

        let dir = self.targets_dir.join(name);
        if dir.join(MANIFEST_FILE).is_file() {
            tracing::debug!("Loading target '{name}' from {}", dir.display());
            return Ok(Box::new(ManifestTarget::load(name, &dir)?));
        }
        if name == BUILTIN_QEMU {
            return Ok(Box::new(QemuTarget::new(&self.targets_dir)));
        }
        Err(BuildError::usage(format!(
            "unknown target '{name}' (available: {})",
            self.available().join(", ")
        )))
    }

    /// Names of every resolvable target, sorted
    pub fn available(&self) -> Vec<String> {
        let mut names = vec![BUILTIN_QEMU.to_string()];
        if let Ok(entries) = std::fs::read_dir(&self.targets_dir) {
            for entry in entries.flatten() {
                if entry.path().join(MANIFEST_FILE).is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }
}
