//! Connection handshake and message of the day.
//!
//! Sequence after the TCP connect:
//! 1. Client sends [`HANDSHAKE`]
//! 2. Server answers [`HANDSHAKE_ACK`]; anything else aborts
//! 3. Client sends the 4-byte endianness probe (no reply)
//! 4. Server sends the MOTD as a `MESS` block (or an `ERR` line), then `OVER`
//!
//! # Example
//!
//! ```
//! # async fn example() -> stp_client::error::Result<()> {
//! use stp_client::control::{perform_handshake, read_motd};
//! use stp_client::protocol::LineReader;
//!
//! let mut reader = LineReader::new(&b"CONNECTED\nMESS\nWelcome\nENDmess\nOVER\n"[..]);
//! let mut sent = Vec::new();
//!
//! perform_handshake(&mut reader, &mut sent).await?;
//! let motd = read_motd(&mut reader).await?;
//! assert_eq!(motd.text, "Welcome\n");
//! # Ok(())
//! # }
//! ```

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, StpError};
use crate::protocol::{
    encode_endian_probe, read_message, tokens, LineReader, MessageEnd, HANDSHAKE, HANDSHAKE_ACK,
};

/// Message of the day sent by the server right after the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Motd {
    /// Text of the `MESS` block (empty if none was sent).
    pub text: String,
    /// Text of an `ERR` line sent instead of a message.
    pub error: Option<String>,
}

/// Send the handshake line, check the acknowledgement, send the probe.
///
/// The probe is only sent once the server has acknowledged.
///
/// # Errors
///
/// [`StpError::Handshake`] if the server replies with anything other than
/// `CONNECTED` (or closes the stream), I/O errors otherwise.
pub async fn perform_handshake<R, W>(reader: &mut LineReader<R>, writer: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(HANDSHAKE).await?;
    writer.flush().await?;

    let reply = reader.read_line().await?;
    let reply = reply
        .as_deref()
        .map(String::from_utf8_lossy)
        .unwrap_or_default();
    let reply = reply.trim_end_matches(['\n', '\r']);
    if reply != HANDSHAKE_ACK {
        return Err(StpError::Handshake {
            received: reply.to_string(),
        });
    }

    writer.write_all(&encode_endian_probe()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the message of the day, including its terminating line.
pub async fn read_motd<R: AsyncRead + Unpin>(reader: &mut LineReader<R>) -> Result<Motd> {
    let mut motd = Motd::default();

    let Some(first) = reader.read_line().await? else {
        tracing::warn!("Stream ended before message of the day");
        return Ok(motd);
    };
    let first = String::from_utf8_lossy(&first);
    let mut words = first.split_whitespace();

    match words.next() {
        Some(tokens::MESS) => {
            let (text, end) = read_message(reader).await?;
            motd.text = text;
            if end != MessageEnd::EndMess {
                return Ok(motd);
            }
        }
        Some(tokens::OVER) => return Ok(motd),
        Some(tokens::ERR) => {
            let text = words.collect::<Vec<_>>().join(" ");
            tracing::warn!(error = %text, "Server error instead of message of the day");
            motd.error = Some(text);
        }
        _ => {
            tracing::debug!(line = %first.trim_end(), "Unexpected message of the day line");
        }
    }

    // Terminating OVER
    reader.read_line().await?;
    Ok(motd)
}
