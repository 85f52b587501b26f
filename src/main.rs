//! rvforge CLI - RISC-V software stack builder
//!
//! Entry point for the rvforge command-line application.

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rvforge::cli::{self, output, Cli, Completion};
use rvforge::error::EXIT_USAGE;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => exit_code(EXIT_USAGE),
            };
        }
    };

    // RUST_LOG wins; --verbose only raises the default
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.run() {
        Ok(Completion::Done) => ExitCode::SUCCESS,
        Ok(Completion::HelpShown) => exit_code(EXIT_USAGE),
        Err(e) => {
            output::display_error(&e);
            if output::is_usage_error(&e) {
                cli::print_usage();
            }
            exit_code(output::exit_code(&e))
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
