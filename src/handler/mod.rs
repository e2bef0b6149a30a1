//! Handler module - consumers of decoded response events.
//!
//! Provides:
//! - [`FileMaterializer`] - writes `DIR`/`FILE`/`DATA` directives to disk
//! - [`MessageAccumulator`] - collects `MESS` text for the caller
//!
//! The session feeds every event of an exchange to each handler in turn.
//!
//! # Example
//!
//! ```no_run
//! use stp_client::handler::{FileMaterializer, MessageAccumulator, ResponseHandler};
//! use stp_client::protocol::ResponseEvent;
//!
//! let mut files = FileMaterializer::new(".");
//! let mut messages = MessageAccumulator::new();
//!
//! let event = ResponseEvent::Message("hello\n".into());
//! files.handle(&event).unwrap();
//! messages.handle(&event).unwrap();
//! assert_eq!(messages.message(), "hello\n");
//! ```

mod files;
mod message;

pub use files::{FileMaterializer, OutputCursor};
pub use message::MessageAccumulator;

use crate::error::Result;
use crate::protocol::ResponseEvent;

/// Consumer of response events.
pub trait ResponseHandler {
    /// Handle one event.
    ///
    /// Errors are per-directive and recoverable: the caller reports them and
    /// keeps feeding the rest of the exchange.
    fn handle(&mut self, event: &ResponseEvent) -> Result<()>;
}
