//! Command execution engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::RemoteCommand;
use super::result::ExecutionResult;
use super::stream::{ConsoleSink, LineReader, LineSink, OutputSource, READ_BUFFER_SIZE};
use crate::error::RemoteBuildError;
use crate::transport::{BoxedReader, Transport};
use crate::Result;

/// How long to wait for readers to hand over partial output after a
/// command was interrupted.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

enum Interrupt {
    TimedOut,
    Cancelled,
}

/// Runs commands through a transport and streams their output.
pub struct CommandExecutor {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn LineSink>,
    default_timeout: Option<Duration>,
    buffer_size: usize,
}

impl CommandExecutor {
    /// Create an executor that echoes output to the console.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sink: Arc::new(ConsoleSink),
            default_timeout: None,
            buffer_size: READ_BUFFER_SIZE,
        }
    }

    /// Send live output somewhere other than the console.
    pub fn with_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Timeout for commands that do not set their own. `None` waits forever.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Chunk size for stream reads.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// The transport commands run through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run `command_line`, optionally from `working_dir`.
    pub async fn run(
        &self,
        command_line: &str,
        working_dir: Option<&str>,
    ) -> Result<ExecutionResult> {
        let mut command = RemoteCommand::new(command_line);
        if let Some(dir) = working_dir {
            command = command.working_dir(dir);
        }
        self.execute(&command).await
    }

    /// Execute a command and wait for both output streams to drain.
    ///
    /// A non-zero exit is not an error here; inspect the returned result.
    /// Errors are reserved for the transport failing to start the command
    /// or losing a stream.
    pub async fn execute(&self, command: &RemoteCommand) -> Result<ExecutionResult> {
        let line = command.shell_line();
        info!("Executing \"{}\" via {}", line, self.transport.name());

        let start = Instant::now();
        let process = self.transport.exec(&line).await?;
        let mut control = process.control;

        let stop = CancellationToken::new();
        let stdout_rx = self.spawn_reader(process.stdout, OutputSource::Stdout, stop.clone());
        let stderr_rx = self.spawn_reader(process.stderr, OutputSource::Stderr, stop.clone());
        let mut drained = Box::pin(async move { tokio::join!(stdout_rx, stderr_rx) });

        let timeout = command.timeout.or(self.default_timeout);
        let cancel = command.cancel.clone().unwrap_or_default();

        // Both the stream drain and the exit status sit under the deadline;
        // a command can close its stdio and keep running.
        let mut outputs = None;
        let outcome = {
            let finished = async {
                outputs = Some((&mut drained).await);
                control.wait().await
            };
            tokio::select! {
                code = finished => Ok(code),
                _ = sleep_or_forever(timeout) => Err(Interrupt::TimedOut),
                _ = cancel.cancelled() => Err(Interrupt::Cancelled),
            }
        };

        let (stdout, stderr, exit_code, timed_out, cancelled) = match outcome {
            Ok(code) => {
                let (out, err) = outputs.ok_or(RemoteBuildError::ChannelClosed)?;
                let stdout = take_output(out)?;
                let stderr = take_output(err)?;
                (stdout, stderr, code?, false, false)
            }
            Err(reason) => {
                match reason {
                    Interrupt::TimedOut => warn!("\"{}\" timed out after {:?}", line, timeout),
                    Interrupt::Cancelled => warn!("\"{}\" cancelled", line),
                }
                stop.cancel();
                if let Err(e) = control.kill().await {
                    warn!("failed to stop \"{}\": {}", line, e);
                }
                let drained = match outputs {
                    Some(outputs) => Ok(outputs),
                    None => tokio::time::timeout(DRAIN_GRACE, drained).await,
                };
                let (stdout, stderr) = match drained {
                    Ok((out, err)) => (
                        take_output(out).unwrap_or_default(),
                        take_output(err).unwrap_or_default(),
                    ),
                    Err(_) => (String::new(), String::new()),
                };
                let timed_out = matches!(reason, Interrupt::TimedOut);
                (stdout, stderr, None, timed_out, !timed_out)
            }
        };

        let duration = start.elapsed();
        debug!("\"{}\" finished in {:?} with {:?}", line, duration, exit_code);

        if !stderr.is_empty() {
            warn!("stderr from \"{}\":\n{}", line, stderr.trim_end());
        }

        let mut result =
            ExecutionResult::new(line, stdout, stderr, duration).with_exit_code(exit_code);
        result.timed_out = timed_out;
        result.cancelled = cancelled;
        Ok(result)
    }

    fn spawn_reader(
        &self,
        reader: BoxedReader,
        source: OutputSource,
        stop: CancellationToken,
    ) -> oneshot::Receiver<std::io::Result<String>> {
        let (tx, rx) = oneshot::channel();
        let reader =
            LineReader::new(reader, source, self.sink.clone()).with_buffer_size(self.buffer_size);
        tokio::spawn(async move {
            let output = reader.run(stop).await;
            if tx.send(output).is_err() {
                debug!("{:?} reader: result receiver dropped", source);
            }
        });
        rx
    }
}

fn take_output(
    received: std::result::Result<std::io::Result<String>, oneshot::error::RecvError>,
) -> Result<String> {
    match received {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(RemoteBuildError::Io(e)),
        Err(_) => Err(RemoteBuildError::ChannelClosed),
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}
