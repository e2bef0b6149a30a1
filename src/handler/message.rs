//! Message accumulator for `MESS` blocks.

use super::ResponseHandler;
use crate::control::write_stdout_text;
use crate::error::Result;
use crate::protocol::ResponseEvent;

/// Collects the free text of one exchange.
///
/// Each message is echoed to stdout as it arrives (when `echo` is on) and
/// appended to the exchange text.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    text: String,
    echo: bool,
}

impl MessageAccumulator {
    /// Create an accumulator that echoes messages to stdout.
    pub fn new() -> Self {
        Self::with_echo(true)
    }

    /// Create an accumulator with explicit echo behaviour.
    pub fn with_echo(echo: bool) -> Self {
        Self {
            text: String::new(),
            echo,
        }
    }

    /// Text accumulated so far.
    pub fn message(&self) -> &str {
        &self.text
    }

    /// Take the accumulated text, leaving the accumulator empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    /// Clear for a new exchange.
    pub fn begin_exchange(&mut self) {
        self.text.clear();
    }

    fn on_message(&mut self, text: &str) {
        if self.echo {
            if let Err(e) = write_stdout_text(text) {
                tracing::warn!("Failed to echo server message: {}", e);
            }
        }
        self.text.push_str(text);
    }
}

impl ResponseHandler for MessageAccumulator {
    fn handle(&mut self, event: &ResponseEvent) -> Result<()> {
        if let ResponseEvent::Message(text) = event {
            self.on_message(text);
        }
        Ok(())
    }
}
