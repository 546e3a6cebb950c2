//! Synchronous execution of the external design tools.

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use super::error::{DesignError, DesignResult};

/// Captured result of one external process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code. Negative values are the signal that terminated the process.
    pub returncode: i32,
    /// Everything the process wrote to stdout.
    pub stdout: String,
    /// Everything the process wrote to stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.returncode == 0
    }
}

/// Runs an argument vector to completion in a working directory.
///
/// A non-zero exit is not an error: it is returned in
/// [`CommandOutput::returncode`].
pub trait CommandExecutor: Send + Sync {
    /// Executes `argv[0]` with the remaining arguments and waits for it.
    ///
    /// # Errors
    ///
    /// Returns an error if `argv` is empty or the program cannot be started.
    fn execute(&self, argv: &[String], cwd: &Path) -> DesignResult<CommandOutput>;
}

/// Executes commands as real OS processes.
///
/// Blocks until the child exits. There is no timeout and the child inherits
/// the server's environment unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, argv: &[String], cwd: &Path) -> DesignResult<CommandOutput> {
        let (program, args) = argv.split_first().ok_or(DesignError::EmptyCommand)?;

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DesignError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        Ok(CommandOutput {
            returncode: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
