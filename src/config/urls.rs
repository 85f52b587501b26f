//! Upstream source repositories

/// RISC-V GNU toolchain (binutils, gcc, newlib, glibc, musl glue)
pub const RISCV_GNU_TOOLCHAIN: &str = "https://github.com/riscv-collab/riscv-gnu-toolchain.git";

/// musl libc
pub const MUSL: &str = "https://git.musl-libc.org/git/musl";

/// QEMU
pub const QEMU: &str = "https://gitlab.com/qemu-project/qemu.git";

/// Linux (stable tree)
pub const LINUX: &str = "https://git.kernel.org/pub/scm/linux/kernel/git/stable/linux.git";

/// riscv-pk, providing the Berkeley Boot Loader
pub const RISCV_PK: &str = "https://github.com/riscv-software-src/riscv-pk.git";

/// OpenSBI
pub const OPENSBI: &str = "https://github.com/riscv-software-src/opensbi.git";

/// BusyBox
pub const BUSYBOX: &str = "https://git.busybox.net/busybox";

/// Dropbear SSH
pub const DROPBEAR: &str = "https://github.com/mkj/dropbear.git";
