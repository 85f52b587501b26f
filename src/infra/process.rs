//! External process execution
//!
//! Every external tool (git, configure scripts, make, cpio) runs through a
//! [`ProcessRunner`]. The system runner appends the command line and all of
//! the child's output to the stage log; nothing is echoed to the console.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// External process errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The program could not be started
    #[error("Failed to start '{program}': {error}")]
    Spawn { program: String, error: String },

    /// The program ran and exited unsuccessfully
    #[error("'{command}' exited with {status}")]
    Failed { command: String, status: String },

    /// The log file could not be opened or written
    #[error("Cannot write log '{path}': {error}")]
    Log { path: PathBuf, error: String },

    /// A stdin or stdout redirection file could not be opened
    #[error("Cannot redirect to '{path}': {error}")]
    Redirect { path: PathBuf, error: String },
}

/// A fully described external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    /// Program name or path
    pub program: String,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Environment variables added to the inherited environment
    pub env: BTreeMap<String, String>,
    /// File read as standard input
    pub stdin: Option<PathBuf>,
    /// File receiving standard output instead of the log
    pub stdout: Option<PathBuf>,
}

impl ExternalCommand {
    /// Create a command for `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            stdin: None,
            stdout: None,
        }
    }

    /// Create a `sh -c <script>` command
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument
    #[must_use]
    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Read standard input from `path`
    #[must_use]
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Write standard output to `path`, truncating it
    #[must_use]
    pub fn stdout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables
    #[must_use]
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Whether `arg` is one of the arguments
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Value of a `NAME=value` argument, as passed to make
    pub fn make_var(&self, name: &str) -> Option<&str> {
        let prefix = format!("{name}=");
        self.args.iter().find_map(|a| a.strip_prefix(&prefix))
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        if let Some(path) = &self.stdin {
            write!(f, " < {}", path.display())?;
        }
        if let Some(path) = &self.stdout {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

/// Runs external commands on behalf of a stage
///
/// Implementations must route all output to `log` and return an error for
/// any non-zero exit.
pub trait ProcessRunner {
    /// Run `command` to completion
    fn run(&mut self, command: &ExternalCommand, log: &Path) -> Result<(), ProcessError>;
}

/// Runner that spawns real processes and blocks until they finish
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new system runner
    pub fn new() -> Self {
        Self
    }

    fn open_log(log: &Path) -> Result<File, ProcessError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .map_err(|e| ProcessError::Log {
                path: log.to_path_buf(),
                error: e.to_string(),
            })
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&mut self, command: &ExternalCommand, log: &Path) -> Result<(), ProcessError> {
        let log_err = |e: std::io::Error| ProcessError::Log {
            path: log.to_path_buf(),
            error: e.to_string(),
        };

        if !host_tool_available(&command.program) {
            return Err(ProcessError::Spawn {
                program: command.program.clone(),
                error: "not found on PATH".to_string(),
            });
        }

        let mut file = Self::open_log(log)?;
        writeln!(file, "$ {command}").map_err(log_err)?;
        if let Some(cwd) = &command.cwd {
            writeln!(file, "  (in {})", cwd.display()).map_err(log_err)?;
        }
        let redirect_err = |path: &Path| {
            let path = path.to_path_buf();
            move |e: std::io::Error| ProcessError::Redirect {
                path,
                error: e.to_string(),
            }
        };
        let stdin = match &command.stdin {
            Some(path) => Stdio::from(File::open(path).map_err(redirect_err(path))?),
            None => Stdio::null(),
        };
        let stdout = match &command.stdout {
            Some(path) => File::create(path).map_err(redirect_err(path))?,
            None => file.try_clone().map_err(log_err)?,
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(stdin)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(file));
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        tracing::debug!("Running: {command}");
        let status = cmd.status().map_err(|e| ProcessError::Spawn {
            program: command.program.clone(),
            error: e.to_string(),
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(ProcessError::Failed {
                command: command.to_string(),
                status: status.to_string(),
            })
        }
    }
}

/// Check whether a host tool is available on `PATH`
pub fn host_tool_available(name: &str) -> bool {
    which::which(name).is_ok()
}
