//! Core build logic
//!
//! Stage implementations and the orchestration around them. External
//! processes run through [`crate::infra::process`]; nothing here spawns a
//! process directly.
//!
//! # Submodules
//!
//! - [`context`] - Per-run build context and one-shot flags
//! - [`workspace`] - Output layout and per-process build logs
//! - [`settings`] - Settings file (`config.toml`)
//! - [`target`] - Targets, command steps and the target registry
//! - [`pipeline`] - Stage orchestration and step dispatch
//! - [`component`] - Shared component build template
//! - [`build_env`] - Cross-compilation environment
//! - [`kconfig`] - Kconfig-style configuration templating
//! - [`patch`] - Ordered patch and patch-script application
//! - [`toolchain`] - RISC-V GNU toolchain variants
//! - [`qemu`] - Emulator stage
//! - [`kernel`] - Linux stage and initramfs embedding
//! - [`bootloader`] - BBL stage
//! - [`firmware`] - OpenSBI stage
//! - [`busybox`] - BusyBox stage
//! - [`dropbear`] - Dropbear stage
//! - [`rootfs`] - Root filesystem assembly
//! - [`clean`] - Workspace cleanup

pub mod bootloader;
pub mod build_env;
pub mod busybox;
pub mod clean;
pub mod component;
pub mod context;
pub mod dropbear;
pub mod firmware;
pub mod kconfig;
pub mod kernel;
pub mod patch;
pub mod pipeline;
pub mod qemu;
pub mod rootfs;
pub mod settings;
pub mod target;
pub mod toolchain;
pub mod workspace;
