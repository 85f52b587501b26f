//! Root filesystem assembly
//!
//! Combines the kernel modules, the BusyBox install and the Dropbear
//! multi-call binary into a directory tree at
//! `<workspace>/<target>/<isa>/rootfs/root`, overlays the init templates and,
//! unless the tree was requested as-is, packs it into `rootfs.cpio.gz`.
//!
//! Templates are compiled in from `templates/rootfs/`; a file with the same
//! name in the configured templates directory takes precedence.

use std::path::{Path, PathBuf};

use crate::core::pipeline::Pipeline;
use crate::error::{BuildError, FilesystemError};
use crate::infra::filesystem;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// Stage name of the root filesystem
pub const ROOTFS_STAGE: &str = "rootfs";

/// Archive name inside the rootfs artifact directory
pub const IMAGE_NAME: &str = "rootfs.cpio.gz";

const ARCHIVE_NAME: &str = "rootfs.cpio";
const LIST_NAME: &str = "rootfs.list";

/// Directories every root filesystem starts with
pub const SKELETON: [&str; 14] = [
    "bin",
    "sbin",
    "dev",
    "proc",
    "sys",
    "etc",
    "etc/init.d",
    "var",
    "lib",
    "root",
    "tmp",
    "usr/bin",
    "usr/sbin",
    "usr/share/udhcpc",
];

/// A file overlaid onto the tree
#[derive(Debug, Clone, Copy)]
pub struct RootfsTemplate {
    /// File name in the templates directory
    pub name: &'static str,
    /// Destination relative to the tree root
    pub dest: &'static str,
    /// Install with mode 0755
    pub executable: bool,
    /// Built-in content
    pub default: &'static str,
}

/// Templates overlaid onto every tree
pub const TEMPLATES: [RootfsTemplate; 4] = [
    RootfsTemplate {
        name: "init",
        dest: "init",
        executable: true,
        default: include_str!("../../templates/rootfs/init"),
    },
    RootfsTemplate {
        name: "inittab",
        dest: "etc/inittab",
        executable: false,
        default: include_str!("../../templates/rootfs/inittab"),
    },
    RootfsTemplate {
        name: "udhcpc.script",
        dest: "usr/share/udhcpc/default.script",
        executable: true,
        default: include_str!("../../templates/rootfs/udhcpc.script"),
    },
    RootfsTemplate {
        name: "motd",
        dest: "etc/motd",
        executable: false,
        default: include_str!("../../templates/rootfs/motd"),
    },
];

impl RootfsTemplate {
    /// Content to install, preferring an override in `dir`
    pub fn content(&self, dir: Option<&Path>) -> Result<String, FilesystemError> {
        match dir.map(|d| d.join(self.name)).filter(|p| p.is_file()) {
            Some(path) => filesystem::read_file(&path),
            None => Ok(self.default.to_string()),
        }
    }

    /// Write the template into the tree rooted at `root`
    pub fn install(&self, root: &Path, dir: Option<&Path>) -> Result<(), FilesystemError> {
        let dest = root.join(self.dest);
        filesystem::write_file(&dest, &self.content(dir)?)?;
        if self.executable {
            filesystem::make_executable(&dest)?;
        }
        Ok(())
    }
}

/// What a root filesystem build produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootfsOutput {
    /// The directory tree, left in place
    Tree(PathBuf),
    /// The packed archive; the tree was removed
    Image(PathBuf),
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Assemble the root filesystem
    ///
    /// Consumes the skip-image request on entry.
    pub fn build_rootfs(&mut self) -> Result<RootfsOutput, BuildError> {
        let skip_image = self.ctx.flags.skip_rootfs_image.take();

        let modules = self.ctx.artifact_dir("linux")?.join("lib/modules");
        if !modules.is_dir() {
            return Err(BuildError::precondition(
                ROOTFS_STAGE,
                format!(
                    "kernel modules not found at {} (run build_kernel first)",
                    modules.display()
                ),
            ));
        }

        let rootfs_dir = self.ctx.artifact_dir(ROOTFS_STAGE)?;
        filesystem::recreate_dir(&rootfs_dir)?;

        let busybox = self.build_busybox()?;
        let dropbear = self.build_dropbear()?;

        let log = self.open_log(ROOTFS_STAGE)?;
        let tree = rootfs_dir.join("root");
        tracing::info!("Assembling root filesystem in {}", tree.display());

        filesystem::create_dir_all(&tree)?;
        for dir in SKELETON {
            filesystem::create_dir_all(&tree.join(dir))?;
        }
        filesystem::copy_tree(&modules, &tree.join("lib/modules"))?;
        filesystem::copy_tree(&busybox, &tree)?;
        filesystem::copy_tree(&dropbear, &tree)?;

        let templates_dir = self.settings.paths.templates.clone();
        for template in &TEMPLATES {
            template.install(&tree, templates_dir.as_deref())?;
        }

        if skip_image {
            tracing::info!("Root filesystem tree left at {}", tree.display());
            return Ok(RootfsOutput::Tree(tree));
        }

        let image = self.pack_tree(&tree, &rootfs_dir, &log)?;

        if !image.is_file() {
            return Err(BuildError::ExternalTool {
                stage: ROOTFS_STAGE.to_string(),
                error: format!("archive '{}' was not created", image.display()),
                log,
            });
        }
        filesystem::remove_dir_all(&tree)?;

        tracing::info!("Root filesystem image written to {}", image.display());
        Ok(RootfsOutput::Image(image))
    }

    /// newc cpio of `tree`, gzipped into `<dir>/rootfs.cpio.gz`
    ///
    /// Every tool runs as its own command with its exit status checked.
    fn pack_tree(&mut self, tree: &Path, dir: &Path, log: &Path) -> Result<PathBuf, BuildError> {
        let list = dir.join(LIST_NAME);
        let archive = dir.join(ARCHIVE_NAME);

        let find = ExternalCommand::new("find")
            .arg(".")
            .current_dir(tree)
            .stdout_file(&list);
        self.run_logged(ROOTFS_STAGE, &find, log)?;

        let cpio = ExternalCommand::new("cpio")
            .args(["-o", "-H", "newc"])
            .current_dir(tree)
            .stdin_file(&list)
            .stdout_file(&archive);
        self.run_logged(ROOTFS_STAGE, &cpio, log)?;

        let gzip = ExternalCommand::new("gzip")
            .args(["-9", "-f"])
            .arg_path(&archive)
            .current_dir(dir);
        self.run_logged(ROOTFS_STAGE, &gzip, log)?;

        filesystem::remove_file(&list)?;
        Ok(dir.join(IMAGE_NAME))
    }
}
