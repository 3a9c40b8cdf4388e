//! Tool protocol port.
//!
//! The supervisor never speaks a wire protocol itself. A `ToolProtocol`
//! implementation is handed the `ProcessChannel` of a pooled process and
//! performs discovery and invocation over it.

use std::io;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{Tool, ToolResult};

/// Boxed writer half of a process channel (the child's stdin).
pub type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed, buffered reader half of a process channel (the child's stdout).
pub type ChannelReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// Errors raised by a protocol implementation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Reading from or writing to the process failed.
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// The server answered with an error.
    #[error("Server error {code}: {message}")]
    Remote { code: i64, message: String },

    /// The process closed its output stream.
    #[error("Channel closed")]
    Closed,

    /// The server answered with something that could not be parsed.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The operation is not supported by this protocol.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Line-oriented byte channel to a pooled process.
///
/// Lock order is writer then reader. `request` holds both for the whole
/// exchange so concurrent callers cannot interleave request/response pairs.
pub struct ProcessChannel {
    process_id: String,
    pid: u32,
    writer: Mutex<Option<ChannelWriter>>,
    reader: Mutex<Option<ChannelReader>>,
}

impl std::fmt::Debug for ProcessChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessChannel")
            .field("process_id", &self.process_id)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl ProcessChannel {
    /// Wrap the given writer (child stdin) and reader (child stdout).
    pub fn new<W, R>(process_id: impl Into<String>, pid: u32, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let writer: ChannelWriter = Box::new(writer);
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            process_id: process_id.into(),
            pid,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(BufReader::new(reader))),
        }
    }

    /// Pool id of the process behind this channel.
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// OS pid of the process behind this channel.
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Write one line, appending `\n`, and flush.
    pub async fn write_line(&self, line: &str) -> Result<(), ProtocolError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::Closed)?;
        Self::write_to(writer, line).await
    }

    /// Read one line with the trailing newline stripped.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub async fn read_line(&self) -> Result<Option<String>, ProtocolError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(ProtocolError::Closed)?;
        Self::read_from(reader).await
    }

    /// Write one line and read the next line of output as its answer.
    pub async fn request(&self, line: &str) -> Result<String, ProtocolError> {
        let mut writer_guard = self.writer.lock().await;
        let mut reader_guard = self.reader.lock().await;
        let writer = writer_guard.as_mut().ok_or(ProtocolError::Closed)?;
        let reader = reader_guard.as_mut().ok_or(ProtocolError::Closed)?;

        Self::write_to(writer, line).await?;
        Self::read_from(reader).await?.ok_or(ProtocolError::Closed)
    }

    /// Raw access to the writer for protocols that frame their own messages.
    pub async fn writer(&self) -> MutexGuard<'_, Option<ChannelWriter>> {
        self.writer.lock().await
    }

    /// Raw access to the reader for protocols that frame their own messages.
    pub async fn reader(&self) -> MutexGuard<'_, Option<ChannelReader>> {
        self.reader.lock().await
    }

    /// Close the child's stdin. Further writes fail with `Closed`.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    async fn write_to(writer: &mut ChannelWriter, line: &str) -> Result<(), ProtocolError> {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_from(reader: &mut ChannelReader) -> Result<Option<String>, ProtocolError> {
        let mut buf = Vec::new();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

/// Protocol spoken with connected servers.
///
/// Implementations must be stateless with respect to a particular process:
/// all per-process state travels through the `ProcessChannel`.
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Ask the server for the list of tools it offers.
    async fn discover_tools(
        &self,
        server_id: &str,
        channel: &ProcessChannel,
    ) -> Result<Vec<Tool>, ProtocolError>;

    /// Invoke one tool with JSON arguments.
    async fn call_tool(
        &self,
        server_id: &str,
        channel: &ProcessChannel,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolResult, ProtocolError>;

    /// Lightweight liveness check at the protocol level.
    async fn ping(&self, _server_id: &str, _channel: &ProcessChannel) -> Result<(), ProtocolError> {
        Ok(())
    }
}

/// Extra health check the process pool applies before reusing a process.
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// Return `true` if the process behind `channel` is usable.
    async fn probe(&self, process_id: &str, channel: &ProcessChannel) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    #[tokio::test]
    async fn request_writes_line_and_reads_answer() {
        let (client_out, server_in) = duplex(1024);
        let (server_out, client_in) = duplex(1024);
        let channel = ProcessChannel::new("echo", 1, client_out, client_in);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_in).lines();
            let mut out = server_out;
            while let Ok(Some(line)) = lines.next_line().await {
                out.write_all(format!("echo:{line}\r\n").as_bytes())
                    .await
                    .unwrap();
            }
        });

        let answer = channel.request("hello").await.unwrap();
        assert_eq!(answer, "echo:hello");

        channel.close().await;
        assert!(matches!(
            channel.write_line("again").await,
            Err(ProtocolError::Closed)
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn read_line_reports_end_of_stream() {
        let (client_out, _server_in) = duplex(64);
        let (server_out, client_in) = duplex(64);
        drop(server_out);
        let channel = ProcessChannel::new("eof", 1, client_out, client_in);

        assert!(channel.read_line().await.unwrap().is_none());
        assert!(matches!(
            channel.request("x").await,
            Err(ProtocolError::Closed | ProtocolError::Transport(_))
        ));
    }
}
