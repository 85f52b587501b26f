//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no build logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{CommandFactory, Parser, Subcommand};

use crate::core::context::Isa;

/// Version string with build metadata
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    " ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ", ",
    env!("VERGEN_CARGO_TARGET_TRIPLE"),
    ")"
);

/// rvforge - RISC-V software stack builder
///
/// Builds toolchains, QEMU, Linux, BBL, OpenSBI and a minimal root
/// filesystem. Target commands are given as `rvforge <target> <command>`.
#[derive(Parser, Debug)]
#[command(name = "rvforge")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(disable_help_subcommand = true)]
#[command(override_usage = "rvforge [OPTIONS] <COMMAND> [ARG]\n       rvforge [OPTIONS] <TARGET> <COMMAND> [ARG]")]
pub struct Cli {
    /// Ignore source caches and clone again
    #[arg(short, long, global = true, env = "RVFORGE_FORCE_REFETCH", value_parser = FalseyValueParser::new())]
    pub force_refetch: bool,

    /// Debug diagnostics; keep the build logs
    #[arg(short, long, global = true, env = "RVFORGE_VERBOSE", value_parser = FalseyValueParser::new())]
    pub verbose: bool,

    /// ISA width (32 or 64)
    #[arg(long, global = true, env = "RVFORGE_ISA")]
    pub isa: Option<Isa>,

    /// Workspace root [default: ./work]
    #[arg(short, long, global = true, env = "RVFORGE_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Shared source cache root
    #[arg(long, global = true, env = "RVFORGE_SOURCES_DIR")]
    pub sources_dir: Option<PathBuf>,

    /// Directory with target manifests [default: ./targets]
    #[arg(long, global = true, env = "RVFORGE_TARGETS_DIR")]
    pub targets_dir: Option<PathBuf>,

    /// Parallel jobs for external builds [default: host cores]
    #[arg(short, long, global = true, env = "RVFORGE_JOBS")]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level commands; anything else names a target
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show usage and the available targets
    Help,

    /// Remove target artifacts, the emulator and stale logs
    Cleanup,

    /// Build every toolchain and QEMU
    Bootstrap,

    /// Build one toolchain (newlib, glibc, musl32, musl64)
    #[command(name = "build_toolchain")]
    BuildToolchain {
        /// Toolchain type
        toolchain: String,
    },

    /// Build QEMU
    #[command(name = "build_qemu")]
    BuildQemu,

    /// `<target> <command> [arg]`
    #[command(external_subcommand)]
    Target(Vec<String>),
}

/// How a successful invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The command ran
    Done,
    /// Only usage was shown
    HelpShown,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(mut self) -> Result<Completion> {
        let options = commands::Options::from_cli(&self)?;
        let Some(command) = self.command.take() else {
            print_help(&options);
            return Ok(Completion::HelpShown);
        };

        match command {
            Commands::Help => {
                print_help(&options);
                return Ok(Completion::HelpShown);
            }
            Commands::Cleanup => commands::clean::execute(&options)?,
            Commands::Bootstrap => commands::build::bootstrap(&options)?,
            Commands::BuildToolchain { toolchain } => {
                commands::build::toolchain(&options, &toolchain)?;
            }
            Commands::BuildQemu => commands::build::qemu(&options)?,
            Commands::Target(args) => commands::build::target(&options, &args)?,
        }
        Ok(Completion::Done)
    }
}

/// Usage line to stderr, after a usage error
pub fn print_usage() {
    eprintln!("\n{}", Cli::command().render_usage());
    eprintln!("Run 'rvforge help' for the commands and targets.");
}

fn print_help(options: &commands::Options) {
    let mut cmd = Cli::command();
    let _ = cmd.print_help();

    println!("\nTarget commands:");
    for (name, arg) in crate::core::target::STANDARD_COMMANDS {
        match arg {
            Some(arg) => println!("  {name} [{arg}]"),
            None => println!("  {name}"),
        }
    }
    let registry = options.registry();
    println!("\nTargets (manifests in {}):", registry.targets_dir().display());
    for name in registry.available() {
        match registry.resolve(&name) {
            Ok(target) => {
                println!("  {name:<16} {}", target.description());
                for extra in target.extra_commands() {
                    println!("  {:<16}   {extra}", "");
                }
            }
            Err(e) => println!("  {name:<16} ({e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_target_invocation_is_captured() {
        let cli = Cli::try_parse_from(["rvforge", "-j", "3", "qemu", "build_kernel", "initramfs"])
            .unwrap();
        assert_eq!(cli.jobs, Some(3));
        match cli.command {
            Some(Commands::Target(args)) => {
                assert_eq!(args, vec!["qemu", "build_kernel", "initramfs"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_top_level_commands() {
        let cli = Cli::try_parse_from(["rvforge", "--isa", "32", "build_toolchain", "musl32"]).unwrap();
        assert_eq!(cli.isa, Some(Isa::Rv32));
        assert!(matches!(
            cli.command,
            Some(Commands::BuildToolchain { toolchain }) if toolchain == "musl32"
        ));

        let cli = Cli::try_parse_from(["rvforge", "help"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Help)));
    }

    #[test]
    fn test_invalid_isa_is_rejected() {
        assert!(Cli::try_parse_from(["rvforge", "--isa", "128", "bootstrap"]).is_err());
    }
}
