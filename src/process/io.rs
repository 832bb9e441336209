//! I/O primitives for communicating with the pi subprocess.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on captured stderr. Older output is discarded first.
pub const MAX_STDERR_BYTES: usize = 256 * 1024;

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// The three pipes a client talks to.
///
/// A spawned [`AgentProcess`](super::AgentProcess) hands out its own pipes;
/// any other byte streams (an in-process fake agent, a socket) can be wrapped
/// with [`AgentIo::new`].
pub struct AgentIo {
    pub(crate) stdin: BoxedWrite,
    pub(crate) stdout: BoxedRead,
    pub(crate) stderr: Option<BoxedRead>,
}

impl AgentIo {
    pub fn new(
        stdin: impl AsyncWrite + Send + Unpin + 'static,
        stdout: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: None,
        }
    }

    /// Capture diagnostics from `stderr` as well.
    pub fn with_stderr(mut self, stderr: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(stderr));
        self
    }
}

impl std::fmt::Debug for AgentIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentIo")
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// Reads newline-delimited frames from the agent's stdout.
///
/// Surrounding ASCII whitespace (including a trailing `\r`) is trimmed and
/// blank lines are skipped. The bytes are not validated; classification
/// happens in the client.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Read the next non-empty line.
    ///
    /// Returns `Ok(None)` at EOF. A final line without a newline is still
    /// returned.
    pub async fn read_line(&mut self) -> std::io::Result<Option<Bytes>> {
        loop {
            self.buffer.clear();
            let read = self.reader.read_until(b'\n', &mut self.buffer).await?;
            if read == 0 {
                return Ok(None);
            }

            let line = self.buffer.trim_ascii();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(Bytes::copy_from_slice(line)));
        }
    }
}

/// Writes framed commands to the agent's stdin.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one frame followed by a newline, then flush.
    pub async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Close the stream so the agent sees EOF on stdin.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Shared, size-capped buffer of the agent's stderr.
#[derive(Debug, Clone, Default)]
pub struct StderrBuffer {
    inner: Arc<Mutex<String>>,
}

impl StderrBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents.
    pub fn snapshot(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn append(&self, chunk: &str) {
        let mut buffer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push_str(chunk);
        if buffer.len() > MAX_STDERR_BYTES {
            let mut cut = buffer.len() - MAX_STDERR_BYTES;
            while !buffer.is_char_boundary(cut) {
                cut += 1;
            }
            buffer.drain(..cut);
        }
    }

    /// Copy `reader` into the buffer until EOF or a read error.
    pub(crate) async fn capture(&self, reader: impl AsyncRead + Unpin) {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => self.append(&String::from_utf8_lossy(&line)),
                Err(e) => {
                    tracing::debug!("stderr capture stopped: {}", e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_types_are_send() {
        fn assert_send<T: Send>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send::<AgentIo>();
        assert_send::<LineReader<tokio::process::ChildStdout>>();
        assert_send_sync::<StderrBuffer>();
    }

    #[tokio::test]
    async fn line_reader_skips_blank_lines() {
        let input: &[u8] = b"{\"type\":\"a\"}\r\n\n   \n{\"type\":\"b\"}";
        let mut reader = LineReader::new(input);

        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"{\"type\":\"a\"}"[..]);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"{\"type\":\"b\"}"[..]);
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn line_reader_trims_surrounding_whitespace() {
        let input: &[u8] = b"  \t{\"type\":\"a\"} \r\n";
        let mut reader = LineReader::new(input);

        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"{\"type\":\"a\"}"[..]);
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn frame_writer_appends_newline() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client);
        writer.write_frame(br#"{"type":"abort"}"#).await.unwrap();
        writer.shutdown().await.unwrap();

        let mut reader = LineReader::new(server);
        assert_eq!(
            reader.read_line().await.unwrap().unwrap(),
            &br#"{"type":"abort"}"#[..]
        );
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stderr_capture_collects_output() {
        let buffer = StderrBuffer::new();
        let input: &[u8] = b"warning: one\nwarning: two";
        buffer.capture(input).await;
        assert_eq!(buffer.snapshot(), "warning: one\nwarning: two");
    }

    #[test]
    fn stderr_buffer_keeps_tail() {
        let buffer = StderrBuffer::new();
        buffer.append(&"a".repeat(MAX_STDERR_BYTES));
        buffer.append("tail");
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), MAX_STDERR_BYTES);
        assert!(snapshot.ends_with("tail"));
    }
}
