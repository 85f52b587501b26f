//! Dropbear stage
//!
//! Builds the SSH server, client and helpers as one static multi-call
//! binary. The install tree holds `bin/dropbearmulti` and one link per
//! program.

use std::path::{Path, PathBuf};

use crate::config::defaults::DROPBEAR_REF;
use crate::config::urls;
use crate::core::component::{Component, StageIo};
use crate::core::context::Isa;
use crate::core::pipeline::Pipeline;
use crate::core::toolchain::ToolchainKind;
use crate::error::BuildError;
use crate::infra::filesystem;
use crate::infra::process::{ExternalCommand, ProcessRunner};

/// Programs linked into the multi-call binary
pub const PROGRAMS: [&str; 4] = ["dropbear", "dbclient", "dropbearkey", "scp"];

/// Name of the multi-call binary
pub const MULTI_BINARY: &str = "dropbearmulti";

/// The Dropbear component
#[derive(Debug, Clone, Copy, Default)]
pub struct Dropbear;

impl Component for Dropbear {
    fn name(&self) -> &'static str {
        "dropbear"
    }

    fn url(&self) -> &'static str {
        urls::DROPBEAR
    }

    fn default_ref(&self) -> &'static str {
        DROPBEAR_REF
    }

    fn toolchain(&self, isa: Isa) -> Option<ToolchainKind> {
        Some(ToolchainKind::musl_for(isa))
    }

    fn configure(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        if !io.source("configure").is_file() {
            let autoconf =
                ExternalCommand::shell("autoconf && autoheader").current_dir(&io.source_dir);
            io.run(autoconf)?;
        }

        let triple = io
            .env
            .toolchain
            .map_or(ToolchainKind::Musl64.triple(), ToolchainKind::triple);
        let configure = ExternalCommand::new("./configure")
            .arg(format!("--host={triple}"))
            .args(["--prefix=/", "--disable-zlib", "--enable-static"])
            .current_dir(&io.source_dir);
        io.run(configure)
    }

    fn build(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let make = io
            .make()
            .arg(format!("PROGRAMS={}", PROGRAMS.join(" ")))
            .args(["MULTI=1", "STATIC=1"]);
        io.run(make)
    }

    fn install(&self, io: &mut StageIo<'_>) -> Result<(), BuildError> {
        let binary = format!("bin/{MULTI_BINARY}");
        io.install_file(MULTI_BINARY, &binary)?;
        filesystem::make_executable(&io.installed(&binary))?;
        for program in PROGRAMS {
            filesystem::symlink(Path::new(MULTI_BINARY), &io.installed(&format!("bin/{program}")))?;
        }
        Ok(())
    }
}

impl<R: ProcessRunner> Pipeline<R> {
    /// Build Dropbear and return its install directory
    pub fn build_dropbear(&mut self) -> Result<PathBuf, BuildError> {
        self.run_component(&mut Dropbear).map(|out| out.install_dir)
    }
}
