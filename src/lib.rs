//! # remote-build
//!
//! Run build steps on a remote host over SSH and keep artifacts in sync.
//!
//! The crate has two engines underneath a small build workflow:
//!
//! - **Command execution**: stdout and stderr of a remote command are drained
//!   concurrently, split into lines and echoed live while the full text of
//!   each stream is collected.
//! - **Content sync**: files are uploaded only when the SHA-256 of the remote
//!   copy differs from the local one.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use remote_build::{CommandExecutor, ContentSyncer, FileArtifact, SshTransport};
//!
//! #[tokio::main]
//! async fn main() -> remote_build::Result<()> {
//!     remote_build::logging::try_init(None).ok();
//!
//!     let transport = SshTransport::new("build.example.org", "builder");
//!     let executor = Arc::new(CommandExecutor::new(Arc::new(transport)));
//!
//!     let result = executor.run("docker --version", None).await?;
//!     println!("{}", result.stdout_trimmed());
//!
//!     let syncer = ContentSyncer::new(executor);
//!     let artifact = FileArtifact::open("action.zip").await?;
//!     let outcome = syncer.upload(&artifact, "~/action").await?;
//!     println!("transferred: {}", outcome.transferred);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod paths;
pub mod sync;
pub mod transport;
pub mod workflow;

// Re-export commonly used types
pub use error::{RemoteBuildError, Result};
pub use execution::{CommandExecutor, ExecutionResult, RemoteCommand};
pub use sync::{ContentDigest, ContentSyncer, FileArtifact, SyncOutcome};
pub use transport::{LocalTransport, SshTransport, Transport};
pub use workflow::{BuildWorkflow, WorkflowReport};
