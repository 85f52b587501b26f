//! BusyBox stage
//!
//! Statically linked against musl, installed with its applet links under
//! `<workspace>/<target>/<isa>/busybox`.

use std::path::PathBuf;

use crate::config::defaults::BUSYBOX_REF;
use crate::config::urls;
use crate::core::component::{Component, StageIo};
use crate::core::context::Isa;
use crate::core::kconfig::ConfigTemplate;
use crate::core::pipeline::Pipeline;
use crate::core::toolchain::ToolchainKind;
use crate::error::BuildError;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// The BusyBox component
#[derive(Debug, Clone, Copy, Default)]
pub struct Busybox;

impl Busybox {
    fn cross_var(io: &StageIo<'_>) -> String {
        format!("CROSS_COMPILE={}", io.env.cross_compile())
    }
}

impl Component for Busybox {
    fn name(&self) -> &'static str {
        "busybox"
    }

    fn url(&self) -> &'static str {
        urls::BUSYBOX
    }

    fn default_ref(&self) -> &'static str {
        BUSYBOX_REF
    }

    fn toolchain(&self, isa: Isa) -> Option<ToolchainKind> {
        Some(ToolchainKind::musl_for(isa))
    }

    fn configure(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let dot_config = io.source(".config");

        if let Some(template) = io.target_config() {
            io.render_config(&template, &dot_config)?;
            // BusyBox's Kconfig has no olddefconfig; accept defaults for new symbols.
            let oldconfig =
                ExternalCommand::shell("yes '' | make oldconfig").current_dir(&io.source_dir);
            return io.run(oldconfig);
        }

        let defconfig = io.make().arg("defconfig");
        io.run(defconfig)?;

        let mut config = ConfigTemplate::load(&dot_config)?;
        config.set_symbol("STATIC", "y");
        config.set_string("CROSS_COMPILER_PREFIX", &io.env.cross_compile());
        config.set_string("PREFIX", &io.install_dir.display().to_string());
        // tc does not build against current kernel headers
        config.disable("TC");
        config.write(&dot_config)?;
        Ok(())
    }

    fn build(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let make = io.make().arg(Self::cross_var(io));
        io.run(make)
    }

    fn install(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let install = io
            .make()
            .arg(Self::cross_var(io))
            .arg(format!("CONFIG_PREFIX={}", io.install_dir.display()))
            .arg("install");
        io.run(install)?;
        io.require_output(&io.installed("bin/busybox"))
    }
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Build BusyBox and return its install directory
    pub fn build_busybox(&mut self) -> Result<PathBuf, BuildError> {
        self.run_component(&mut Busybox).map(|out| out.install_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{BuildContext, TargetInfo};
    use crate::core::settings::Settings;
    use crate::core::workspace::LogSession;
    use crate::test_utils::RecordingRunner;
    use tempfile::TempDir;

    #[test]
    fn test_defconfig_is_made_static_for_musl() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("sources/busybox");
        let install = temp.path().join("work/qemu/rv32/busybox");
        let (src, dest) = (source.clone(), install.clone());
        let runner = RecordingRunner::new().on_success(move |cmd| {
            if cmd.has_arg("defconfig") {
                std::fs::create_dir_all(&src).unwrap();
                std::fs::write(src.join(".config"), "# CONFIG_STATIC is not set\nCONFIG_TC=y\n")
                    .unwrap();
            } else if cmd.has_arg("install") {
                std::fs::create_dir_all(dest.join("bin")).unwrap();
                std::fs::write(dest.join("bin/busybox"), "").unwrap();
            }
        });

        let mut ctx = BuildContext::new(temp.path().join("work")).with_isa(Isa::Rv32);
        ctx.target = Some(TargetInfo {
            name: "qemu".to_string(),
            patch_dir: temp.path().join("patches"),
            config_dir: temp.path().join("configs"),
        });
        std::fs::create_dir_all(ctx.workspace.toolchain_dir(ToolchainKind::Musl32)).unwrap();
        let logs = LogSession::in_dir(temp.path().join("logs"), false).unwrap();
        let mut pipeline =
            Pipeline::new(ctx, Settings::default(), runner, logs, temp.path().join("sources"));

        assert_eq!(pipeline.build_busybox().unwrap(), install);

        let config = ConfigTemplate::load(&source.join(".config")).unwrap();
        assert!(config.is_enabled("STATIC"));
        assert!(!config.is_enabled("TC"));
        assert_eq!(
            config.get("CROSS_COMPILER_PREFIX"),
            Some("\"riscv32-unknown-linux-musl-\"")
        );

        let make_install = pipeline.runner().commands().last().unwrap();
        assert_eq!(
            make_install.make_var("CONFIG_PREFIX"),
            Some(install.to_str().unwrap())
        );
    }
}
