//! Production runner: spawns the engine as a child process.
//!
//! Arguments are passed as an argument vector, never through a shell, so
//! filenames and option values reach the engine byte-for-byte. Stdin is
//! closed, stdout is captured, and stderr is discarded.

use super::runner::{CommandRunner, Invocation, MagickError, RunOutput};
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval while waiting on a child with a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs invocations as real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

fn startup_failure(program: &str, err: io::Error) -> MagickError {
    MagickError::StartupFailure {
        program: program.to_string(),
        kind: err.kind(),
        message: err.to_string(),
    }
}

impl CommandRunner for ProcessRunner {
    fn execute(&self, invocation: &Invocation) -> Result<RunOutput, MagickError> {
        let program = invocation.program.as_str();
        let mut child = Command::new(program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| startup_failure(program, e))?;

        // Drain stdout on its own thread so a chatty child cannot block on a
        // full pipe while we wait for it.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| startup_failure(program, io::Error::other("stdout not captured")))?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let status = match invocation.timeout {
            Some(timeout) => wait_with_deadline(&mut child, timeout).map_err(|e| match e {
                WaitError::Io(e) => startup_failure(program, e),
                WaitError::Expired => MagickError::Timeout {
                    command: invocation.command_line.clone(),
                    timeout,
                },
            })?,
            None => child.wait().map_err(|e| startup_failure(program, e))?,
        };

        let bytes = reader
            .join()
            .map_err(|_| startup_failure(program, io::Error::other("stdout reader panicked")))?
            .map_err(|e| startup_failure(program, e))?;

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&bytes).into_owned(),
            code: status.code(),
        })
    }
}

enum WaitError {
    Io(io::Error),
    Expired,
}

/// Wait for `child`, killing it if it outlives `timeout`.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<ExitStatus, WaitError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(WaitError::Io)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            log::warn!("killing process {} after {:?}", child.id(), timeout);
            // The child may exit between try_wait and kill; either way reap it.
            let _ = child.kill();
            let _ = child.wait();
            return Err(WaitError::Expired);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
