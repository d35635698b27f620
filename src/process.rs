//! External tool invocation.
//!
//! Every compiler, archiver, extractor and QA tool run goes through a
//! [`ToolRunner`]. Commands are described by [`Cmd`] values first and handed
//! to a runner afterwards, so the build logic never spawns processes behind
//! the caller's back and tests can substitute a recording runner.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use tracing::debug;

use crate::error::{Error, Result};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code, or -1 if terminated by signal.
    pub code: i32,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    fn from_status(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        }
    }
}

/// Description of one external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    /// If true, a non-zero exit is returned instead of raised.
    allow_fail: bool,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            allow_fail: false,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Add several paths as arguments.
    pub fn arg_paths<'a, I>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        self.args
            .extend(paths.into_iter().map(|p| p.to_string_lossy().into_owned()));
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Program name or path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if set.
    pub fn get_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Turn a finished result into an error unless failures are allowed.
    pub fn check(&self, result: CommandResult) -> Result<CommandResult> {
        if self.allow_fail || result.success() {
            return Ok(result);
        }
        Err(Error::Subprocess {
            program: self.program.clone(),
            code: result.code,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes [`Cmd`] descriptions.
///
/// Implementations must be shareable across the worker threads of a build
/// wave.
pub trait ToolRunner: Send + Sync {
    /// Run the command to completion and capture its output.
    ///
    /// A non-zero exit is an [`Error::Subprocess`] unless the command
    /// allows failure.
    fn run(&self, cmd: &Cmd) -> Result<CommandResult>;
}

/// Runner that spawns real host processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        debug!(command = %cmd, "spawning");
        let mut command = Command::new(cmd.program());
        command.args(cmd.get_args());
        if let Some(dir) = cmd.get_dir() {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| Error::Spawn {
            program: cmd.program().to_string(),
            source,
        })?;

        cmd.check(CommandResult::from_status(
            output.status,
            &output.stdout,
            &output.stderr,
        ))
    }
}

impl<R: ToolRunner + ?Sized> ToolRunner for &R {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        (**self).run(cmd)
    }
}

impl<R: ToolRunner + ?Sized> ToolRunner for std::sync::Arc<R> {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        (**self).run(cmd)
    }
}

// =============================================================================
// Tests
// =============================================================================
