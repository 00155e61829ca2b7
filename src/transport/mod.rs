//! Transport abstraction layer.
//!
//! A transport knows how to start a shell command on the target host and
//! hand back its two output streams, and how to copy file bytes to and from
//! that host. It says nothing about line framing; that is the executor's job.

mod local;
#[cfg(test)]
pub(crate) mod memory;
mod ssh;

pub use local::LocalTransport;
pub use ssh::{is_local_host, SshTransport};

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::Result;

/// A boxed byte stream from a running command.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Lifecycle control for a started command.
#[async_trait]
pub trait ProcessControl: Send {
    /// Wait for the command to exit and return its exit code.
    ///
    /// `None` means the command ended without a code (e.g. killed by a
    /// signal).
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Stop the command. Its streams reach end-of-file afterwards.
    async fn kill(&mut self) -> Result<()>;
}

/// A command started by a [`Transport`].
pub struct RemoteProcess {
    /// Standard output of the command.
    pub stdout: BoxedReader,
    /// Standard error of the command.
    pub stderr: BoxedReader,
    /// Exit status and termination.
    pub control: Box<dyn ProcessControl>,
}

impl RemoteProcess {
    /// Assemble a process from its parts.
    pub fn new(stdout: BoxedReader, stderr: BoxedReader, control: Box<dyn ProcessControl>) -> Self {
        Self {
            stdout,
            stderr,
            control,
        }
    }
}

/// Remote execution and file transfer capability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Start `command_line` in a POSIX shell on the target.
    async fn exec(&self, command_line: &str) -> Result<RemoteProcess>;

    /// Copy a local file's bytes to a concrete remote path.
    async fn put(&self, local: &Path, remote: &str) -> Result<()>;

    /// Copy a remote file, or a directory when `recursive`, into `local`.
    async fn get(&self, remote: &str, local: &Path, recursive: bool) -> Result<()>;
}
