//! Line-delimited transport for MCP server.
//!
//! MCP's stdio transport rules:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines and contain no embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! The transport is generic over its reader and writer so that a session can
//! be driven from in-memory buffers.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Transport over the process's stdin and stdout.
pub type StdioTransport = Transport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

/// A newline-delimited JSON message transport.
pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

impl StdioTransport {
    /// Creates a transport over stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over the given reader and writer.
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` at EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }

        let trimmed_len = line.trim_end_matches(|c: char| c == '\n' || c == '\r').len();
        line.truncate(trimmed_len);

        Ok(Some(line))
    }

    /// Serialises `message` as a single JSON line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Compact serde_json output escapes newlines inside strings
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Consumes the transport, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}
