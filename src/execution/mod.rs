//! Command execution engine.
//!
//! This module provides command execution capabilities:
//! - Concurrent, line-buffered draining of stdout and stderr
//! - Live echo of every line while the command runs
//! - Timeout and cancellation handling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use remote_build::execution::{CommandExecutor, RemoteCommand};
//! use remote_build::transport::SshTransport;
//!
//! # async fn demo() -> remote_build::Result<()> {
//! let executor = CommandExecutor::new(Arc::new(SshTransport::new("build.example.org", "builder")));
//!
//! let result = executor.run("uname -a", None).await?;
//! println!("Output: {}", result.stdout);
//!
//! let cmd = RemoteCommand::new("sudo docker build -t runtime .")
//!     .working_dir("~/runtime")
//!     .timeout(Duration::from_secs(1800));
//! let result = executor.execute(&cmd).await?;
//! assert!(result.success());
//! # Ok(())
//! # }
//! ```

mod command;
mod executor;
mod result;
mod stream;

pub use command::RemoteCommand;
pub use executor::CommandExecutor;
pub use result::ExecutionResult;
pub use stream::{
    ChannelSink, ConsoleSink, LineSink, NullSink, OutputLine, OutputSource, READ_BUFFER_SIZE,
};
