//! Error types for remote-build.

use thiserror::Error;

/// Main error type for remote-build operations.
#[derive(Error, Debug)]
pub enum RemoteBuildError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport could not start or finish an operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// A command exited unsuccessfully and the caller treats that as fatal.
    #[error("command `{command}` failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Command execution timeout.
    #[error("command execution timeout")]
    Timeout,

    /// Command execution was cancelled.
    #[error("command execution cancelled")]
    Cancelled,

    /// A stream reader went away before handing over its output.
    #[error("channel closed")]
    ChannelClosed,

    /// A local or remote path could not be used.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Building the source archive failed.
    #[error("packaging error: {0}")]
    Packaging(String),

    /// Configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background task panicked or was aborted.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<zip::result::ZipError> for RemoteBuildError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Packaging(err.to_string())
    }
}

/// Convenience Result type for remote-build operations.
pub type Result<T> = std::result::Result<T, RemoteBuildError>;
