//! Transport module - the TCP connection to the server.
//!
//! One [`Connection`] per session; requests are never pipelined.

mod tcp;

pub use tcp::Connection;
