//! Protocol module - wire constants, line/raw reader, response decoding.
//!
//! This module implements the server side of the conversation as seen by
//! the client:
//! - Wire constants (handshake, directive tokens, output formats)
//! - A single-buffer reader for interleaved lines and raw payloads
//! - The response decoder producing typed [`ResponseEvent`]s

mod decoder;
mod line_reader;
mod response;
mod wire_format;

pub use decoder::{read_message, MessageEnd, ResponseDecoder};
pub use line_reader::LineReader;
pub use response::ResponseEvent;
pub use wire_format::{
    encode_endian_probe, tokens, DataFormat, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_LINE_LENGTH,
    ENDIAN_PROBE, HANDSHAKE, HANDSHAKE_ACK,
};
