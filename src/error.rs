//! Error types for stp-client.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all STP operations.
#[derive(Debug, Error)]
pub enum StpError {
    /// I/O error during socket or filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server did not acknowledge the handshake.
    #[error("Handshake rejected, server replied {received:?}")]
    Handshake { received: String },

    /// Operation requires a live connection.
    #[error("STP is not connected")]
    NotConnected,

    /// Requested waveform output format is not one the server knows.
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Stream ended in the middle of a raw payload.
    #[error("Stream truncated: expected {expected} bytes, received {received}")]
    TruncatedStream { expected: usize, received: usize },

    /// A `DIR` directive could not be materialized.
    #[error("Could not create directory {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `FILE` directive could not be opened for writing.
    #[error("Could not open {} for writing: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Text of an `ERR` directive.
    #[error("Server error: {0}")]
    Server(String),

    /// Catalog line that does not match the expected record layout.
    #[error("Malformed record ({reason}): {line:?}")]
    MalformedRecord { line: String, reason: String },

    /// Protocol violation (oversized line, bad DATA length, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl StpError {
    /// Build a [`StpError::MalformedRecord`] for `line`.
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        StpError::MalformedRecord {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using StpError.
pub type Result<T> = std::result::Result<T, StpError>;
