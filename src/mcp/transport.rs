//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! # Outbound messages
//!
//! Replies and server notifications are produced from more than one place
//! (the dispatcher and timer tasks). They all go through a [`SendFn`], which
//! queues the serialised message on a channel drained by a single writer
//! task, so lines are never interleaved.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::mcp::registry::BoxFuture;

/// Asynchronous function delivering one serialised message to the client.
pub type SendFn = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// The reading half of the stdio transport.
pub struct StdioTransport {
    /// Buffered reader for stdin.
    reader: BufReader<tokio::io::Stdin>,
}

impl StdioTransport {
    /// Creates a new stdio transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
        }
    }

    /// Reads the next message line from stdin.
    ///
    /// Returns `None` if stdin is closed (EOF).
    ///
    /// # Errors
    ///
    /// Returns an error if reading from stdin fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            // EOF - stdin closed
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a [`SendFn`] writing to stdout, plus the writer task.
///
/// The writer task finishes once every clone of the returned [`SendFn`] has
/// been dropped and the queue is drained.
#[must_use]
pub fn stdout_sender() -> (SendFn, JoinHandle<io::Result<()>>) {
    channel_sender(tokio::io::stdout())
}

/// Creates a [`SendFn`] writing newline-delimited messages to `writer`.
pub fn channel_sender<W>(writer: W) -> (SendFn, JoinHandle<io::Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let task = tokio::spawn(write_loop(writer, rx));

    let send: SendFn = Arc::new(move |message| {
        let tx = tx.clone();
        Box::pin(async move {
            if tx.send(message).is_err() {
                tracing::warn!("Outbound channel closed, dropping message");
            }
        })
    });

    (send, task)
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        // Stdio framing forbids embedded newlines
        debug_assert!(
            !message.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        writer.write_all(message.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}
