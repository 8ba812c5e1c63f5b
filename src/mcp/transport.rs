//! Stdio transport.
//!
//! Reads newline-delimited JSON-RPC from stdin and writes one response line
//! per request to stdout. Messages are handled strictly one at a time, so
//! responses come out in request order.
//!
//! Stdin is read on a dedicated thread that forwards lines over a channel.
//! A blocking read on that thread never holds up shutdown: the loop stops
//! watching the channel and the thread is left to die with the process.

use std::io::{self, BufRead, Cursor};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::mcp::protocol::{encode_response, DecodeError, JsonRpcResponse};
use crate::mcp::router::MethodRouter;

/// How a transport loop should react to an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The peer is gone; stop the loop.
    Terminal,
    /// Skip the offending message and keep serving.
    Recoverable,
}

impl Severity {
    pub fn is_terminal(self) -> bool {
        matches!(self, Severity::Terminal)
    }
}

/// Classify an I/O error. Broken or closed streams are terminal.
pub fn classify_io_error(err: &io::Error) -> Severity {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::WriteZero => Severity::Terminal,
        _ => Severity::Recoverable,
    }
}

/// Lines read ahead of the loop.
const STDIN_BUFFER: usize = 16;

type Chunk = Cursor<Vec<u8>>;

/// Async view of a byte stream fed by [`spawn_line_reader`].
pub type LineReader = StreamReader<ReceiverStream<io::Result<Chunk>>, Chunk>;

/// Read `source` line by line on a dedicated OS thread.
///
/// The thread exits on EOF, after a terminal read error, or once the
/// returned reader is dropped and the next line fails to send.
pub fn spawn_line_reader<S>(source: S) -> LineReader
where
    S: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STDIN_BUFFER);

    let spawned = std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || forward_lines(source, tx));
    if let Err(e) = spawned {
        // The sender went down with the closure, so the reader sees EOF.
        error!("Failed to start stdin reader thread: {}", e);
    }

    StreamReader::new(ReceiverStream::new(rx))
}

fn forward_lines<S: BufRead>(mut source: S, tx: mpsc::Sender<io::Result<Chunk>>) {
    loop {
        let mut line = Vec::new();
        match source.read_until(b'\n', &mut line) {
            Ok(0) => return,
            Ok(_) => {
                if tx.blocking_send(Ok(Cursor::new(line))).is_err() {
                    return;
                }
            }
            Err(e) => {
                let terminal = classify_io_error(&e).is_terminal();
                if tx.blocking_send(Err(e)).is_err() || terminal {
                    return;
                }
            }
        }
    }
}

/// Serial line-oriented transport over a reader/writer pair.
pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
}

impl StdioTransport<LineReader, Stdout> {
    /// Transport bound to the process's stdin and stdout.
    pub fn new() -> Self {
        Self::with_streams(spawn_line_reader(io::BufReader::new(io::stdin())), tokio::io::stdout())
    }
}

impl Default for StdioTransport<LineReader, Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn with_streams(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Serve until EOF, shutdown, or a terminal I/O error.
    ///
    /// EOF and shutdown return `Ok(())`. Terminal errors are returned so the
    /// caller can exit non-zero.
    pub async fn run(&mut self, router: &MethodRouter, shutdown: &CancellationToken) -> Result<()> {
        info!("Stdio transport ready");
        let mut line = Vec::with_capacity(4096);

        loop {
            line.clear();
            let read = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping stdio transport");
                    return Ok(());
                }
                read = self.reader.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => {
                    debug!("EOF on stdin, stopping transport");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if classify_io_error(&e).is_terminal() => {
                    error!("Error reading stdin: {}", e);
                    return Err(Error::Io(e));
                }
                Err(e) => {
                    warn!("Skipping unreadable message: {}", e);
                    let response = DecodeError::Parse(e.to_string()).into_response();
                    self.write_response(&response).await?;
                    continue;
                }
            }

            let message = line.trim_ascii();
            if message.is_empty() {
                continue;
            }
            trace!("Received: {}", String::from_utf8_lossy(message));

            if let Some(response) = router.dispatch_bytes(message, shutdown, None).await {
                self.write_response(&response).await?;
            }
        }
    }

    /// Write one response line and flush it.
    ///
    /// A recoverable write failure drops this response only.
    async fn write_response(&mut self, response: &JsonRpcResponse) -> Result<()> {
        let mut bytes = encode_response(response);
        bytes.push(b'\n');

        let written = async {
            self.writer.write_all(&bytes).await?;
            self.writer.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(()),
            Err(e) if classify_io_error(&e).is_terminal() => {
                error!("Error writing to stdout: {}", e);
                Err(Error::Io(e))
            }
            Err(e) => {
                warn!("Dropped response after write error: {}", e);
                Ok(())
            }
        }
    }
}
