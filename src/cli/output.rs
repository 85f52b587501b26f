//! Output formatting and progress indicators
//!
//! Console output is kept to a spinner per command and one status line at
//! the end; everything the external tools print goes to the stage logs.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::BuildError;

/// Create a spinner for a command of unknown duration
///
/// Hidden in verbose mode so it does not interleave with log lines.
pub fn create_spinner(message: &str, verbose: bool) -> ProgressBar {
    if verbose {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.blue} {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix
    pub const SUCCESS: &str = "✓";

    /// Error prefix
    pub const ERROR: &str = "✗";

    /// Info prefix
    pub const INFO: &str = "ℹ";
}

/// Print a success line
pub fn success(message: &str) {
    println!("{} {message}", status::SUCCESS);
}

/// Report where the logs of this run were kept
pub fn logs_kept(dir: &Path) {
    eprintln!("{} Logs kept in {}", status::INFO, dir.display());
}

/// Print an error and its causes to stderr
pub fn display_error(err: &anyhow::Error) {
    eprintln!("{} {err}", status::ERROR);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
    if let Some(log) = err.downcast_ref::<BuildError>().and_then(BuildError::log_path) {
        eprintln!("  see {} for the full output", log.display());
    }
}

/// Whether the error calls for the usage text
pub fn is_usage_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<BuildError>().is_some_and(BuildError::is_usage)
}

/// Exit code for an error returned from a command
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<BuildError>()
        .map_or(crate::error::EXIT_FAILURE, BuildError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EXIT_FAILURE, EXIT_USAGE};

    #[test]
    fn test_exit_code_follows_build_error() {
        let usage = anyhow::Error::from(BuildError::usage("unknown target 'x'"));
        assert_eq!(exit_code(&usage), EXIT_USAGE);

        let other = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&other), EXIT_FAILURE);
    }

    #[test]
    fn test_exit_code_survives_context() {
        let err = anyhow::Error::from(BuildError::usage("bad")).context("while parsing");
        assert_eq!(exit_code(&err), EXIT_USAGE);
    }

    #[test]
    fn test_only_usage_errors_ask_for_usage() {
        assert!(is_usage_error(&anyhow::Error::from(BuildError::usage("unknown target 'x'"))));
        assert!(!is_usage_error(&anyhow::Error::from(BuildError::precondition(
            "linux", "missing"
        ))));
        assert!(!is_usage_error(&anyhow::anyhow!("other")));
    }

    #[test]
    fn test_verbose_spinner_is_hidden() {
        assert!(create_spinner("Building", true).is_hidden());
    }
}
