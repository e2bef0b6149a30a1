//! Typed events decoded from a server response.

use bytes::Bytes;

/// One event in a server response stream.
///
/// Produced by [`ResponseDecoder`](super::ResponseDecoder); an exchange is
/// the sequence of events up to and including [`ResponseEvent::Over`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// End of the current exchange.
    Over,
    /// Free text from a `MESS ... ENDmess` block, newlines preserved.
    Message(String),
    /// Descend into output subdirectory `name`.
    Directory(String),
    /// Start a new output file `name`.
    File(String),
    /// Raw payload of a `DATA <n>` directive.
    DataChunk(Bytes),
    /// `ENDdata` marker.
    EndData,
    /// Words following an `ERR` token.
    Error(Vec<String>),
}

impl ResponseEvent {
    /// Check if this event terminates the exchange.
    #[inline]
    pub fn is_over(&self) -> bool {
        matches!(self, ResponseEvent::Over)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseEvent::Over => "Over",
            ResponseEvent::Message(_) => "Message",
            ResponseEvent::Directory(_) => "Directory",
            ResponseEvent::File(_) => "File",
            ResponseEvent::DataChunk(_) => "DataChunk",
            ResponseEvent::EndData => "EndData",
            ResponseEvent::Error(_) => "Error",
        }
    }

    /// Error text of an [`ResponseEvent::Error`], words joined by spaces.
    pub fn error_text(&self) -> Option<String> {
        match self {
            ResponseEvent::Error(words) => Some(words.join(" ")),
            _ => None,
        }
    }
}
