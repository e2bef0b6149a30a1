//! Stdout output for server-originated text.
//!
//! The MOTD and `MESS` blocks are meant for the user, so they go to stdout
//! as they arrive. Diagnostics go through `tracing` instead.
//!
//! # Important
//!
//! - Text is written verbatim; server lines already carry their `\n`
//! - Flushes immediately so messages show up before the exchange ends
//!
//! # Example
//!
//! ```ignore
//! use stp_client::control::write_stdout_text;
//!
//! write_stdout_text("Welcome to STP\n")?;
//! ```

use std::io::Write;

/// Write text to stdout without adding a newline, then flush.
///
/// # Errors
///
/// Returns IO error if write or flush fails.
pub fn write_stdout_text(text: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(text.as_bytes())?;
    handle.flush()?;
    Ok(())
}

/// Write a line to stdout.
///
/// Writes the string followed by a single `\n` and flushes.
///
/// # Errors
///
/// Returns IO error if write or flush fails.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(line.as_bytes())?;
    handle.write_all(b"\n")?;
    handle.flush()?;
    Ok(())
}
