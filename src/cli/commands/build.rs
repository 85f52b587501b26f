//! Build commands
//!
//! `bootstrap`, `build_toolchain`, `build_qemu` and every
//! `<target> <command>` invocation.

use anyhow::Result;

use crate::cli::commands::{run_stages, Options};
use crate::core::toolchain::ToolchainKind;
use crate::error::BuildError;
use crate::infra::process::SystemRunner;

/// Build every toolchain and the emulator
pub fn bootstrap(options: &Options) -> Result<()> {
    run_stages(
        options,
        options.context(),
        SystemRunner::new(),
        "Bootstrap",
        |pipeline| pipeline.bootstrap_generic(),
    )
}

/// Build one toolchain variant
///
/// The type is checked before anything touches the workspace.
pub fn toolchain(options: &Options, name: &str) -> Result<()> {
    let kind: ToolchainKind = name.parse()?;
    run_stages(
        options,
        options.context(),
        SystemRunner::new(),
        &format!("{kind} toolchain"),
        |pipeline| pipeline.build_toolchain(kind).map(|_| ()),
    )
}

/// Build the emulator
pub fn qemu(options: &Options) -> Result<()> {
    run_stages(
        options,
        options.context(),
        SystemRunner::new(),
        "QEMU",
        |pipeline| pipeline.build_qemu().map(|_| ()),
    )
}

/// Run `<target> <command> [arg]`
pub fn target(options: &Options, args: &[String]) -> Result<()> {
    let [name, command, rest @ ..] = args else {
        let name = args.first().map_or("", String::as_str);
        return Err(BuildError::usage(format!(
            "unknown command '{name}' (target commands are given as: rvforge <target> <command> [arg])"
        ))
        .into());
    };

    let target = options.registry().resolve(name)?;
    let invocation = target.validate_arguments(command, rest)?;

    let mut ctx = options.context();
    target.prepare_environment(&mut ctx)?;
    tracing::debug!("Target {name}: {invocation:?}");

    run_stages(
        options,
        ctx,
        SystemRunner::new(),
        &format!("{name} {command}"),
        |pipeline| target.run_command(pipeline, &invocation),
    )
}
