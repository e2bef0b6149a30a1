//! Control module - connection handshake and user-facing output.
//!
//! Every connection starts with a fixed exchange before any request can be
//! sent.
//!
//! # Workflow
//!
//! 1. Client opens the TCP connection
//! 2. Client sends the handshake line, server answers `CONNECTED`
//! 3. Client sends the endianness probe
//! 4. Server sends the message of the day
//! 5. Request exchanges begin
//!
//! # Example
//!
//! ```ignore
//! use stp_client::control::{perform_handshake, read_motd, write_stdout_text};
//!
//! perform_handshake(&mut reader, &mut writer).await?;
//! let motd = read_motd(&mut reader).await?;
//! write_stdout_text(&motd.text)?;
//! ```

mod handshake;
mod stdio;

pub use handshake::{perform_handshake, read_motd, Motd};
pub use stdio::{write_stdout_line, write_stdout_text};
