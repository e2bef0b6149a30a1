//! TCP connection to an STP server.
//!
//! The socket is split once: the read half is wrapped in a [`LineReader`]
//! for the lifetime of the connection so read-ahead is never lost between
//! exchanges, the write half is used directly for command lines.
//!
//! # Example
//!
//! ```ignore
//! use stp_client::transport::Connection;
//!
//! let mut conn = Connection::connect("stp.gps.caltech.edu", 9999).await?;
//! conn.send_line("event -e 12345").await?;
//! ```

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::Result;
use crate::protocol::{LineReader, DEFAULT_MAX_LINE_LENGTH};

/// An open connection: buffered read half plus raw write half.
pub struct Connection {
    reader: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: String,
}

impl Connection {
    /// Connect to `host:port` with the default line length limit.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_max_line_length(host, port, DEFAULT_MAX_LINE_LENGTH).await
    }

    /// Connect to `host:port`.
    pub async fn connect_with_max_line_length(
        host: &str,
        port: u16,
        max_line_length: usize,
    ) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| format!("{}:{}", host, port));

        let (read_half, writer) = stream.into_split();
        Ok(Self {
            reader: LineReader::with_max_line_length(read_half, max_line_length),
            writer,
            peer,
        })
    }

    /// Remote address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Get the buffered read half.
    pub fn reader_mut(&mut self) -> &mut LineReader<OwnedReadHalf> {
        &mut self.reader
    }

    /// Get the write half.
    pub fn writer_mut(&mut self) -> &mut OwnedWriteHalf {
        &mut self.writer
    }

    /// Borrow both halves at once.
    pub fn halves_mut(&mut self) -> (&mut LineReader<OwnedReadHalf>, &mut OwnedWriteHalf) {
        (&mut self.reader, &mut self.writer)
    }

    /// Send one command line, adding the trailing `\n` if missing.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut down the write side and drop the connection.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("Error shutting down connection to {}: {}", self.peer, e);
        }
    }
}
