//! Engine invocation: the [`CommandRunner`] trait and shared error type.
//!
//! A runner executes one fully prepared [`Invocation`] and reports the raw
//! outcome as a [`RunOutput`]. Turning that outcome into success or a
//! classified [`MagickError`] is done once, in [`run_invocation`], so the
//! production [`ProcessRunner`](super::process_runner::ProcessRunner) and
//! the test mock share the same failure rules.

use super::builder::ArgBuilder;
use super::limits::{Resource, ResourceLimits};
use serde::Serialize;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MagickError {
    #[error("failed to start `{program}`: {kind:?}: {message}")]
    StartupFailure {
        program: String,
        kind: io::ErrorKind,
        message: String,
    },
    #[error("{message} (exit status: {})\n  Command: {command}", display_code(.code))]
    NonZeroExit {
        message: String,
        code: Option<i32>,
        command: String,
    },
    #[error("command timed out after {timeout:?}\n  Command: {command}")]
    Timeout { command: String, timeout: Duration },
    #[error("unknown options for resize: {0}")]
    UnknownResizeOptions(String),
    #[error("conflicting options for resize (shrink_only and expand_only): {0}")]
    ConflictingResizeOptions(String),
    #[error("indeterminate results for image size: {}", path.display())]
    IndeterminateSize { path: PathBuf },
    #[error("unknown resource `{0}` (expected area, map, disk, memory or file)")]
    UnknownResource(String),
    #[error("invalid limit value `{value}` for {resource}")]
    InvalidLimitValue { resource: Resource, value: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MagickError {
    /// Exit code of a failed engine run, if this is one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            MagickError::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }
}

/// Result of a probe operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "terminated by signal".to_string(),
    }
}

/// A fully prepared engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    /// Limit arguments followed by the builder's arguments.
    pub args: Vec<OsString>,
    /// Human-readable command line, used in logs and errors.
    pub command_line: String,
    pub error_message: Option<String>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Compose `<program> <limit params> <args>`.
    pub fn new(program: &str, limits: &ResourceLimits, args: &ArgBuilder) -> Self {
        let mut argv: Vec<OsString> = limits.as_args().into_iter().map(OsString::from).collect();
        argv.extend(args.to_args());

        let command_line = [
            program.to_string(),
            limits.as_invocation_params(),
            args.render(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Self {
            program: program.to_string(),
            args: argv,
            command_line,
            error_message: None,
            timeout: None,
        }
    }

    pub fn with_error_message(mut self, message: Option<&str>) -> Self {
        self.error_message = message.map(str::to_string);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw outcome of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl RunOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            code: Some(0),
        }
    }

    pub fn failure(code: i32) -> Self {
        Self {
            stdout: String::new(),
            code: Some(code),
        }
    }
}

/// Executes prepared invocations.
///
/// Implementations return `Err` only when the process could not be run to
/// completion (startup failure, timeout). A non-zero exit is reported in
/// [`RunOutput::code`] and classified by [`run_invocation`].
pub trait CommandRunner: Sync {
    fn execute(&self, invocation: &Invocation) -> Result<RunOutput, MagickError>;
}

/// Run `invocation` and return its stdout, or the classified failure.
pub fn run_invocation(
    runner: &impl CommandRunner,
    invocation: &Invocation,
) -> Result<String, MagickError> {
    log::debug!("running: {}", invocation.command_line);
    let output = runner.execute(invocation)?;
    if output.code == Some(0) {
        return Ok(output.stdout);
    }

    log::debug!(
        "command exited with {}: {}",
        display_code(&output.code),
        invocation.command_line
    );
    let message = invocation
        .error_message
        .clone()
        .unwrap_or_else(|| format!("command failed: {}.", invocation.program));
    Err(MagickError::NonZeroExit {
        message,
        code: output.code,
        command: invocation.command_line.clone(),
    })
}
