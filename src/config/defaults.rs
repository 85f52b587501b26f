//! Default configuration values

/// Default workspace root, relative to the current directory
pub const DEFAULT_WORKSPACE_DIR: &str = "work";

/// Default directory holding manifest targets, relative to the current directory
pub const DEFAULT_TARGETS_DIR: &str = "targets";

/// Directory name of the emulator install inside the workspace
pub const EMULATOR_DIR: &str = "qemu";

/// Pinned riscv-gnu-toolchain release
pub const TOOLCHAIN_REF: &str = "2024.04.12";

/// Pinned musl release for the musl toolchains
pub const MUSL_REF: &str = "v1.2.5";

/// Pinned QEMU release
pub const QEMU_REF: &str = "v8.2.2";

/// Pinned Linux release
pub const LINUX_REF: &str = "v6.6";

/// Pinned riscv-pk (BBL) release
pub const RISCV_PK_REF: &str = "v1.0.0";

/// Pinned OpenSBI release
pub const OPENSBI_REF: &str = "v1.4";

/// Pinned BusyBox release
pub const BUSYBOX_REF: &str = "1_36_1";

/// Pinned Dropbear release
pub const DROPBEAR_REF: &str = "DROPBEAR_2022.83";

/// Firmware platform used when a target does not set one
pub const DEFAULT_FIRMWARE_PLATFORM: &str = "generic";
