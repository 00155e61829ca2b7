//! Command building and representation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::paths;

/// A command to be executed on the target host.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    /// The command line to execute.
    pub command_line: String,
    /// Directory to `cd` into first (if any).
    pub working_dir: Option<String>,
    /// Maximum execution time. Falls back to the executor default.
    pub timeout: Option<Duration>,
    /// Token that stops the command when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl RemoteCommand {
    /// Create a new command with the given command line.
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            working_dir: None,
            timeout: None,
            cancel: None,
        }
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Attach a cancellation token.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The exact line handed to the remote shell.
    ///
    /// A working directory is chained with `&&` so the command never runs
    /// in the wrong place when the `cd` fails.
    pub fn shell_line(&self) -> String {
        match self.working_dir.as_deref() {
            Some(dir) if !dir.is_empty() => {
                format!("cd {} && {}", paths::quote_dir(dir), self.command_line)
            }
            _ => self.command_line.clone(),
        }
    }
}

impl From<&str> for RemoteCommand {
    fn from(command_line: &str) -> Self {
        Self::new(command_line)
    }
}

impl From<String> for RemoteCommand {
    fn from(command_line: String) -> Self {
        Self::new(command_line)
    }
}
