//! Response decoder: turns the server byte stream into [`ResponseEvent`]s.
//!
//! Implements a small state machine:
//! - `Idle`: read a line, dispatch on its first token
//! - `InMessage`: read lines verbatim until `ENDmess`, `OVER` or end of stream
//!
//! `DATA <n>` switches the underlying [`LineReader`] to raw mode for exactly
//! `n` bytes. A stream that ends early, in either mode, is reported as
//! [`ResponseEvent::Over`] so that callers always see a terminated exchange.
//!
//! # Example
//!
//! ```
//! # async fn example() -> stp_client::error::Result<()> {
//! use stp_client::protocol::{LineReader, ResponseDecoder, ResponseEvent};
//!
//! let mut reader = LineReader::new(&b"FILE a.sac\nDATA 1\n\x07OVER\n"[..]);
//! let mut decoder = ResponseDecoder::new(&mut reader);
//!
//! assert_eq!(decoder.next_event().await?, ResponseEvent::File("a.sac".into()));
//! assert!(matches!(decoder.next_event().await?, ResponseEvent::DataChunk(_)));
//! assert_eq!(decoder.next_event().await?, ResponseEvent::Over);
//! # Ok(())
//! # }
//! ```

use tokio::io::AsyncRead;

use super::line_reader::LineReader;
use super::response::ResponseEvent;
use super::wire_format::{tokens, DEFAULT_MAX_CHUNK_SIZE};
use crate::error::{Result, StpError};

/// How a `MESS` block ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEnd {
    /// `ENDmess` line.
    EndMess,
    /// `OVER` line; the exchange is over too.
    Over,
    /// Stream ended inside the block.
    Eof,
}

/// Decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between directives.
    Idle,
    /// Inside a `MESS` block.
    InMessage,
    /// A message block ended on `OVER`; next event is `Over`.
    PendingOver,
    /// `Over` has been emitted.
    Finished,
}

/// Decoder for one exchange's response stream.
pub struct ResponseDecoder<'a, R> {
    reader: &'a mut LineReader<R>,
    state: State,
    max_chunk_size: usize,
    truncated: bool,
}

impl<'a, R: AsyncRead + Unpin> ResponseDecoder<'a, R> {
    /// Create a decoder over `reader` with the default chunk size limit.
    pub fn new(reader: &'a mut LineReader<R>) -> Self {
        Self::with_max_chunk_size(reader, DEFAULT_MAX_CHUNK_SIZE)
    }

    /// Create a decoder with a custom limit on `DATA` payload size.
    pub fn with_max_chunk_size(reader: &'a mut LineReader<R>, max_chunk_size: usize) -> Self {
        Self {
            reader,
            state: State::Idle,
            max_chunk_size,
            truncated: false,
        }
    }

    /// Decode the next event.
    ///
    /// After `Over` has been returned, every further call returns `Over`
    /// without touching the stream.
    ///
    /// # Errors
    ///
    /// I/O errors from the stream, an oversized line, or a `DATA` line whose
    /// length is missing, unparsable or above the configured maximum.
    ///
    /// A bad `DATA` length is fatal for the stream: the payload boundary is
    /// unknown, so nothing after it can be decoded. The session drops the
    /// connection on any error returned here.
    pub async fn next_event(&mut self) -> Result<ResponseEvent> {
        match self.state {
            State::Finished => return Ok(ResponseEvent::Over),
            State::PendingOver => return Ok(self.finish()),
            State::Idle | State::InMessage => {}
        }

        loop {
            let Some(raw) = self.reader.read_line().await? else {
                tracing::warn!("Stream ended before OVER, closing exchange");
                self.truncated = true;
                return Ok(self.finish());
            };
            let line = String::from_utf8_lossy(&raw);
            tracing::trace!(line = %line.trim_end(), "received");

            let mut words = line.split_whitespace();
            let Some(token) = words.next() else {
                continue;
            };

            match token {
                tokens::OVER => return Ok(self.finish()),
                tokens::FILE => match words.next() {
                    Some(name) => return Ok(ResponseEvent::File(name.to_string())),
                    None => tracing::warn!("FILE directive without a name, ignoring"),
                },
                tokens::DIR => match words.next() {
                    Some(name) => return Ok(ResponseEvent::Directory(name.to_string())),
                    None => tracing::warn!("DIR directive without a name, ignoring"),
                },
                tokens::MESS => {
                    self.state = State::InMessage;
                    let (text, end) = read_message(&mut *self.reader).await?;
                    self.state = match end {
                        MessageEnd::EndMess => State::Idle,
                        MessageEnd::Over => State::PendingOver,
                        MessageEnd::Eof => {
                            tracing::warn!("Stream ended inside a message block");
                            self.truncated = true;
                            State::PendingOver
                        }
                    };
                    return Ok(ResponseEvent::Message(text));
                }
                tokens::DATA => {
                    let len = match words.next().map(str::parse::<usize>) {
                        Some(Ok(len)) => len,
                        _ => {
                            return Err(StpError::Protocol(format!(
                                "Invalid DATA length in {:?}",
                                line.trim_end()
                            )));
                        }
                    };
                    if len > self.max_chunk_size {
                        return Err(StpError::Protocol(format!(
                            "DATA size {} exceeds maximum {}",
                            len, self.max_chunk_size
                        )));
                    }

                    match self.reader.read_exact(len).await {
                        Ok(bytes) => return Ok(ResponseEvent::DataChunk(bytes)),
                        Err(StpError::TruncatedStream { expected, received }) => {
                            tracing::warn!(expected, received, "Stream truncated inside DATA");
                            self.truncated = true;
                            return Ok(self.finish());
                        }
                        Err(e) => return Err(e),
                    }
                }
                tokens::END_DATA => return Ok(ResponseEvent::EndData),
                tokens::ERR => {
                    return Ok(ResponseEvent::Error(words.map(str::to_string).collect()));
                }
                other => {
                    tracing::debug!(token = other, "Ignoring unknown directive");
                }
            }
        }
    }

    /// Check whether the exchange ended because the stream ran out.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Check whether `Over` has been emitted.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    fn finish(&mut self) -> ResponseEvent {
        self.state = State::Finished;
        ResponseEvent::Over
    }
}

/// Read the body of a `MESS` block, the `MESS` line already consumed.
///
/// Lines are kept verbatim, including their newline, until a line that is
/// exactly `ENDmess` or `OVER` (the terminator itself is not included).
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut LineReader<R>,
) -> Result<(String, MessageEnd)> {
    let mut message = String::new();

    loop {
        let Some(raw) = reader.read_line().await? else {
            return Ok((message, MessageEnd::Eof));
        };
        let line = String::from_utf8_lossy(&raw);

        match line.trim_end_matches(['\n', '\r']) {
            tokens::END_MESS => return Ok((message, MessageEnd::EndMess)),
            tokens::OVER => return Ok((message, MessageEnd::Over)),
            _ => message.push_str(&line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    async fn decode_all(input: &[u8]) -> Vec<ResponseEvent> {
        let mut reader = LineReader::new(input);
        let mut decoder = ResponseDecoder::new(&mut reader);
        let mut events = Vec::new();
        loop {
            let event = decoder.next_event().await.unwrap();
            let over = event.is_over();
            events.push(event);
            if over {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn test_file_and_data() {
        let events = decode_all(b"FILE a.sac\nDATA 3\n\x01\x02\x03OVER\n").await;
        assert_eq!(
            events,
            vec![
                ResponseEvent::File("a.sac".to_string()),
                ResponseEvent::DataChunk(Bytes::from_static(&[1, 2, 3])),
                ResponseEvent::Over,
            ]
        );
    }

    #[tokio::test]
    async fn test_message_block() {
        let events = decode_all(b"MESS\nhello\nworld\nENDmess\nOVER\n").await;
        assert_eq!(
            events,
            vec![
                ResponseEvent::Message("hello\nworld\n".to_string()),
                ResponseEvent::Over,
            ]
        );
    }

    #[tokio::test]
    async fn test_message_terminated_by_over() {
        let mut reader = LineReader::new(&b"MESS\nhi\nOVER\nFILE later\n"[..]);
        let mut decoder = ResponseDecoder::new(&mut reader);

        assert_eq!(
            decoder.next_event().await.unwrap(),
            ResponseEvent::Message("hi\n".to_string())
        );
        assert_eq!(decoder.next_event().await.unwrap(), ResponseEvent::Over);
        assert!(decoder.is_finished());
        assert!(!decoder.was_truncated());
        // The line after OVER belongs to the next exchange.
        assert_eq!(
            reader.read_line().await.unwrap().unwrap(),
            &b"FILE later\n"[..]
        );
    }

    #[tokio::test]
    async fn test_message_lines_are_not_tokenized() {
        let events = decode_all(b"MESS\n  OVER the top\nFILE x\nENDmess\nOVER\n").await;
        assert_eq!(
            events[0],
            ResponseEvent::Message("  OVER the top\nFILE x\n".to_string())
        );
    }

    #[tokio::test]
    async fn test_directory_end_data_and_error() {
        let events = decode_all(b"DIR 12345\n\nENDdata\nERR no such event\nOVER\n").await;
        assert_eq!(
            events,
            vec![
                ResponseEvent::Directory("12345".to_string()),
                ResponseEvent::EndData,
                ResponseEvent::Error(vec![
                    "no".to_string(),
                    "such".to_string(),
                    "event".to_string()
                ]),
                ResponseEvent::Over,
            ]
        );
        assert_eq!(
            events[2].error_text().as_deref(),
            Some("no such event")
        );
    }

    #[tokio::test]
    async fn test_unknown_directives_are_ignored() {
        let events = decode_all(b"HELLO there\nover\nOVER\n").await;
        assert_eq!(events, vec![ResponseEvent::Over]);
    }

    #[tokio::test]
    async fn test_zero_length_data() {
        let events = decode_all(b"FILE empty\nDATA 0\nOVER\n").await;
        assert_eq!(events[1], ResponseEvent::DataChunk(Bytes::new()));
        assert_eq!(events[2], ResponseEvent::Over);
    }

    #[tokio::test]
    async fn test_eof_is_over() {
        let mut reader = LineReader::new(&b"FILE a\n"[..]);
        let mut decoder = ResponseDecoder::new(&mut reader);
        assert_eq!(
            decoder.next_event().await.unwrap(),
            ResponseEvent::File("a".to_string())
        );
        assert_eq!(decoder.next_event().await.unwrap(), ResponseEvent::Over);
        assert!(decoder.was_truncated());
        // Sticky after finishing
        assert_eq!(decoder.next_event().await.unwrap(), ResponseEvent::Over);
    }

    #[tokio::test]
    async fn test_truncated_data_is_over() {
        let mut reader = LineReader::new(&b"FILE a\nDATA 10\nabc"[..]);
        let mut decoder = ResponseDecoder::new(&mut reader);
        decoder.next_event().await.unwrap();
        assert_eq!(decoder.next_event().await.unwrap(), ResponseEvent::Over);
        assert!(decoder.was_truncated());
    }

    #[tokio::test]
    async fn test_eof_inside_message() {
        let events = decode_all(b"MESS\npartial\n").await;
        assert_eq!(
            events,
            vec![
                ResponseEvent::Message("partial\n".to_string()),
                ResponseEvent::Over
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_data_length() {
        let mut reader = LineReader::new(&b"DATA lots\n"[..]);
        let mut decoder = ResponseDecoder::new(&mut reader);
        let err = decoder.next_event().await.unwrap_err();
        assert!(matches!(err, StpError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_data_over_limit() {
        let mut reader = LineReader::new(&b"DATA 100\n"[..]);
        let mut decoder = ResponseDecoder::with_max_chunk_size(&mut reader, 10);
        let err = decoder.next_event().await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[tokio::test]
    async fn test_crlf_lines() {
        let events = decode_all(b"MESS\r\nhi\r\nENDmess\r\nOVER\r\n").await;
        assert_eq!(
            events,
            vec![
                ResponseEvent::Message("hi\r\n".to_string()),
                ResponseEvent::Over
            ]
        );
    }
}
