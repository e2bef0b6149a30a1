//! # stp-client
//!
//! Async Rust client for the STP seismic data protocol.
//!
//! The client requests triggered waveforms, catalog events and phase picks
//! from an STP server over a single TCP connection, and writes the returned
//! waveform files to a local directory.
//!
//! ## Architecture
//!
//! - **Protocol**: one byte stream carrying text directives and raw `DATA`
//!   payloads, read through a single buffered [`protocol::LineReader`]
//! - **Handlers**: decoded events drive the file materializer and the
//!   message accumulator
//! - **Session**: handshake, message of the day, and one request exchange
//!   at a time
//!
//! ## Example
//!
//! ```no_run
//! use stp_client::codec::{CatalogFilter, StpCatalogDecoder};
//! use stp_client::Session;
//!
//! #[tokio::main]
//! async fn main() -> stp_client::Result<()> {
//!     let mut session = Session::builder().output_dir("/tmp/stp").connect().await?;
//!
//!     let events = session
//!         .request_event_catalog(&CatalogFilter::new().event_ids([37301704]), &StpCatalogDecoder)
//!         .await?;
//!     println!("{:?}", events);
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod control;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod session;

pub use error::{Result, StpError};
pub use protocol::{DataFormat, ResponseEvent};
pub use session::{
    ExchangeOutcome, Session, SessionBuilder, SessionConfig, SessionState, DEFAULT_HOST,
    DEFAULT_PORT,
};
