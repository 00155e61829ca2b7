//! Line-buffered stream draining.
//!
//! Each output stream of a command gets its own [`LineReader`]. Bytes are
//! read in chunks and split on `\n`; every completed line goes to the live
//! [`LineSink`] and into the stream's running buffer.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default buffer size for reading command output.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Source of output data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputSource {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// One completed line of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: OutputSource,
    /// Line text without its terminator.
    pub text: String,
}

/// Destination for live output.
pub trait LineSink: Send + Sync {
    /// Called once per completed line, in stream order.
    fn emit(&self, source: OutputSource, line: &str);
}

/// Echoes stdout lines to our stdout and stderr lines to our stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl LineSink for ConsoleSink {
    fn emit(&self, source: OutputSource, line: &str) {
        // A closed terminal must not take the run down with it.
        let _ = match source {
            OutputSource::Stdout => writeln!(std::io::stdout().lock(), "{}", line),
            OutputSource::Stderr => writeln!(std::io::stderr().lock(), "{}", line),
        };
    }
}

/// Discards live output; the result buffers still capture everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LineSink for NullSink {
    fn emit(&self, _source: OutputSource, _line: &str) {}
}

/// Forwards lines over a channel (ignored once the receiver is dropped).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutputLine>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutputLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LineSink for ChannelSink {
    fn emit(&self, source: OutputSource, line: &str) {
        let _ = self.tx.send(OutputLine {
            source,
            text: line.to_string(),
        });
    }
}

/// Drains one stream into lines.
pub(crate) struct LineReader<R> {
    reader: R,
    source: OutputSource,
    sink: Arc<dyn LineSink>,
    buffer_size: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R, source: OutputSource, sink: Arc<dyn LineSink>) -> Self {
        Self {
            reader,
            source,
            sink,
            buffer_size: READ_BUFFER_SIZE,
        }
    }

    /// Create with custom buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Read until end-of-stream or until `stop` fires, returning every line
    /// seen so far.
    ///
    /// A trailing fragment without a newline is flushed as a final line.
    pub async fn run(mut self, stop: CancellationToken) -> std::io::Result<String> {
        let mut buf = vec![0u8; self.buffer_size];
        let mut pending: Vec<u8> = Vec::new();
        let mut collected = String::new();

        loop {
            let n = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    debug!("{:?} reader: stopped", self.source);
                    break;
                }
                read = self.reader.read(&mut buf) => read?,
            };
            if n == 0 {
                debug!("{:?} reader: EOF", self.source);
                break;
            }
            trace!("{:?} reader: read {} bytes", self.source, n);

            let scan_from = pending.len();
            pending.extend_from_slice(&buf[..n]);
            if !pending[scan_from..].contains(&b'\n') {
                continue;
            }

            let mut start = 0;
            while let Some(offset) = pending[start..].iter().position(|b| *b == b'\n') {
                let end = start + offset;
                self.flush(&pending[start..end], &mut collected);
                start = end + 1;
            }
            pending.drain(..start);
        }

        if !pending.is_empty() {
            trace!(
                "{:?} reader: flushing {} byte unterminated fragment",
                self.source,
                pending.len()
            );
            self.flush(&pending, &mut collected);
        }

        Ok(collected)
    }

    fn flush(&self, raw: &[u8], collected: &mut String) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        self.sink.emit(self.source, &line);
        collected.push_str(&line);
        collected.push('\n');
    }
}
