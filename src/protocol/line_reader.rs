//! Buffered reader with line mode and raw mode over one stream.
//!
//! Uses a single `bytes::BytesMut` buffer shared by both primitives:
//! - [`LineReader::read_line`]: next `\n`-terminated line
//! - [`LineReader::read_exact`]: exactly `n` raw bytes
//!
//! Bytes read ahead while looking for a newline stay in the buffer and are
//! handed to the next call, whichever mode it uses. This is what lets the
//! decoder switch to raw mode right after a `DATA <n>` line without losing
//! or duplicating payload bytes.
//!
//! # Example
//!
//! ```
//! # async fn example() -> stp_client::error::Result<()> {
//! use stp_client::protocol::LineReader;
//!
//! let stream: &[u8] = b"DATA 3\n\x01\x02\x03OVER\n";
//! let mut reader = LineReader::new(stream);
//!
//! assert_eq!(reader.read_line().await?.as_deref(), Some(&b"DATA 3\n"[..]));
//! assert_eq!(&reader.read_exact(3).await?[..], &[1, 2, 3]);
//! assert_eq!(reader.read_line().await?.as_deref(), Some(&b"OVER\n"[..]));
//! assert!(reader.read_line().await?.is_none());
//! # Ok(())
//! # }
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::DEFAULT_MAX_LINE_LENGTH;
use crate::error::{Result, StpError};

/// Initial buffer capacity (64KB).
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Buffered reader over an async byte stream.
pub struct LineReader<R> {
    /// Underlying stream.
    inner: R,
    /// Bytes read from the stream and not yet handed out.
    buffer: BytesMut,
    /// Set once the stream returned 0 bytes.
    eof: bool,
    /// Maximum allowed line length.
    max_line_length: usize,
    /// Bytes already scanned for a newline (avoids rescanning).
    scanned: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Create a new reader with default settings.
    pub fn new(inner: R) -> Self {
        Self::with_max_line_length(inner, DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a new reader with a custom maximum line length.
    pub fn with_max_line_length(inner: R, max_line_length: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            eof: false,
            max_line_length,
            scanned: 0,
        }
    }

    /// Read the next line, including its trailing `\n`.
    ///
    /// A final line without a newline is returned as is. Returns `Ok(None)`
    /// once the stream has ended and nothing is buffered.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if no newline shows up within
    /// `max_line_length` bytes, or an I/O error from the stream.
    pub async fn read_line(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(pos) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
                let end = self.scanned + pos + 1;
                self.scanned = 0;
                return Ok(Some(self.buffer.split_to(end).freeze()));
            }
            self.scanned = self.buffer.len();

            if self.buffer.len() > self.max_line_length {
                return Err(StpError::Protocol(format!(
                    "Line exceeds maximum length {}",
                    self.max_line_length
                )));
            }

            if self.eof || self.fill().await? == 0 {
                self.scanned = 0;
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                // Unterminated trailing line
                return Ok(Some(self.buffer.split().freeze()));
            }
        }
    }

    /// Read exactly `n` raw bytes.
    ///
    /// Buffered bytes are consumed first, the rest comes from the stream.
    ///
    /// # Errors
    ///
    /// Returns [`StpError::TruncatedStream`] if the stream ends before `n`
    /// bytes are available. The partial bytes are discarded.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        if self.buffer.len() < n {
            self.buffer.reserve(n - self.buffer.len());
        }

        while self.buffer.len() < n {
            if self.eof || self.fill().await? == 0 {
                let received = self.buffer.len();
                self.buffer.clear();
                self.scanned = 0;
                return Err(StpError::TruncatedStream {
                    expected: n,
                    received,
                });
            }
        }

        self.scanned = 0;
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Check whether the underlying stream has reported end of stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Get the number of buffered bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Get a mutable reference to the underlying stream.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader, returning the underlying stream.
    ///
    /// Any buffered bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read more bytes from the stream into the buffer.
    async fn fill(&mut self) -> Result<usize> {
        let n = self.inner.read_buf(&mut self.buffer).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_in_order() {
        let mut reader = LineReader::new(&b"OVER\nFILE a.sac\n"[..]);

        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"OVER\n"[..]);
        assert_eq!(
            reader.read_line().await.unwrap().unwrap(),
            &b"FILE a.sac\n"[..]
        );
        assert!(reader.read_line().await.unwrap().is_none());
        assert!(reader.is_eof());
    }

    #[tokio::test]
    async fn test_unterminated_last_line() {
        let mut reader = LineReader::new(&b"OVER"[..]);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"OVER"[..]);
        assert!(reader.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_raw_bytes_after_line_come_from_read_ahead() {
        // The payload contains a newline; it must not be taken as a line.
        let data = b"DATA 4\nab\ncOVER\n";
        let mut reader = LineReader::new(&data[..]);

        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"DATA 4\n"[..]);
        assert_eq!(&reader.read_exact(4).await.unwrap()[..], b"ab\nc");
        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"OVER\n"[..]);
    }

    #[tokio::test]
    async fn test_read_exact_zero() {
        let mut reader = LineReader::new(&b"OVER\n"[..]);
        assert!(reader.read_exact(0).await.unwrap().is_empty());
        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"OVER\n"[..]);
    }

    #[tokio::test]
    async fn test_read_exact_truncated() {
        let mut reader = LineReader::new(&b"\x01\x02"[..]);
        let err = reader.read_exact(5).await.unwrap_err();
        assert!(matches!(
            err,
            StpError::TruncatedStream {
                expected: 5,
                received: 2
            }
        ));
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_byte_at_a_time_stream() {
        let (client, mut server) = tokio::io::duplex(1);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            server.write_all(b"FILE x\nDATA 2\n\xff\xfeOVER\n").await.unwrap();
        });

        let mut reader = LineReader::new(client);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"FILE x\n"[..]);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"DATA 2\n"[..]);
        assert_eq!(&reader.read_exact(2).await.unwrap()[..], &[0xff, 0xfe]);
        assert_eq!(reader.read_line().await.unwrap().unwrap(), &b"OVER\n"[..]);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_max_line_length() {
        let long = vec![b'x'; 100];
        let mut reader = LineReader::with_max_line_length(&long[..], 16);
        let err = reader.read_line().await.unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }
}
