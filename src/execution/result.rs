//! Execution result types.

use std::time::Duration;

use crate::error::RemoteBuildError;

/// Result of command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// The shell line that was run.
    pub command: String,
    /// Captured standard output, one `\n` per line.
    pub stdout: String,
    /// Captured standard error, one `\n` per line.
    pub stderr: String,
    /// Exit code (if the command completed with one).
    pub exit_code: Option<i32>,
    /// Execution duration.
    pub duration: Duration,
    /// Whether execution timed out.
    pub timed_out: bool,
    /// Whether execution was cancelled.
    pub cancelled: bool,
}

impl ExecutionResult {
    /// Create a new execution result.
    pub fn new(command: impl Into<String>, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            command: command.into(),
            stdout,
            stderr,
            duration,
            ..Self::default()
        }
    }

    /// Set the exit code.
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Check if command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }

    /// Check if command failed (anything but a clean zero exit).
    pub fn failed(&self) -> bool {
        !self.success()
    }

    /// Get stdout as string, trimmed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stdout lines.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }

    /// Whether `needle` appears in either stream.
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }

    /// Turn an unsuccessful result into the matching error.
    pub fn into_error(self) -> RemoteBuildError {
        if self.timed_out {
            RemoteBuildError::Timeout
        } else if self.cancelled {
            RemoteBuildError::Cancelled
        } else {
            RemoteBuildError::CommandFailed {
                command: self.command,
                exit_code: self.exit_code,
                stderr: self.stderr.trim_end().to_string(),
            }
        }
    }
}
