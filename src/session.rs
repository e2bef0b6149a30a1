//! Session builder and request exchanges.
//!
//! The [`SessionBuilder`] provides a fluent API for configuring a
//! [`Session`]. The session manages the connection lifecycle:
//! 1. Open the TCP connection
//! 2. Handshake and endianness probe
//! 3. Read the message of the day
//! 4. Run request exchanges, one at a time
//!
//! Each exchange sends one command line and decodes the response until
//! `OVER`, feeding every event to the [`FileMaterializer`] and the
//! [`MessageAccumulator`].
//!
//! # Example
//!
//! ```no_run
//! use stp_client::codec::{CatalogFilter, WaveformFilter};
//! use stp_client::Session;
//!
//! # async fn example() -> stp_client::error::Result<()> {
//! let mut session = Session::builder()
//!     .host("stp.gps.caltech.edu")
//!     .output_dir("/tmp/stp")
//!     .build();
//! session.connect().await?;
//!
//! let events = session
//!     .request_events(&CatalogFilter::new().magnitude(5.0, 9.0))
//!     .await?;
//! let files = session
//!     .request_waveforms(&[37301704], &WaveformFilter::new().network("CI"), "sac")
//!     .await?;
//!
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::codec::catalog::is_comment_line;
use crate::codec::{
    decode_files, decode_phase_lines, event_command, phase_command, trig_command,
    CatalogDecoder, CatalogFilter, Command, EventRecord, PhaseRecord, WaveformDecoder,
    WaveformFilter, WaveformResult,
};
use crate::control::{perform_handshake, read_motd, write_stdout_line, write_stdout_text, Motd};
use crate::error::{Result, StpError};
use crate::handler::{FileMaterializer, MessageAccumulator, ResponseHandler};
use crate::protocol::{
    DataFormat, ResponseDecoder, ResponseEvent, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_LINE_LENGTH,
};
use crate::transport::Connection;

/// Default STP server host.
pub const DEFAULT_HOST: &str = "stp.gps.caltech.edu";

/// Default STP server port.
pub const DEFAULT_PORT: u16 = 9999;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Root directory for materialized files.
    pub output_dir: PathBuf,
    /// Log every directive at debug level.
    pub verbose: bool,
    /// Print the message of the day on connect.
    pub show_motd: bool,
    /// Echo `MESS` text to stdout as it arrives.
    pub echo_messages: bool,
    /// Maximum accepted line length.
    pub max_line_length: usize,
    /// Maximum accepted `DATA` payload.
    pub max_chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            output_dir: PathBuf::from("."),
            verbose: false,
            show_motd: true,
            echo_messages: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

/// Builder for configuring and creating a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port.
    ///
    /// Default: 9999
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the root directory for materialized files.
    ///
    /// Default: current directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Log each directive and command.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Print the message of the day on connect.
    ///
    /// Default: true
    pub fn show_motd(mut self, show: bool) -> Self {
        self.config.show_motd = show;
        self
    }

    /// Echo server messages to stdout as they arrive.
    ///
    /// Default: true
    pub fn echo_messages(mut self, echo: bool) -> Self {
        self.config.echo_messages = echo;
        self
    }

    /// Set the maximum accepted line length.
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len;
        self
    }

    /// Set the maximum accepted `DATA` payload size.
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    /// Build a disconnected session.
    pub fn build(self) -> Session {
        Session::new(self.config)
    }

    /// Build the session and connect it.
    pub async fn connect(self) -> Result<Session> {
        let mut session = self.build();
        session.connect().await?;
        Ok(session)
    }
}

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// What one request produced.
#[derive(Debug, Default)]
pub struct ExchangeOutcome {
    /// Files opened, in the order the server announced them.
    pub files: Vec<PathBuf>,
    /// Concatenated `MESS` text.
    pub message: String,
    /// Text of each `ERR` directive.
    pub server_errors: Vec<String>,
    /// Directory/file errors; the exchange continued past each of them.
    pub file_errors: Vec<StpError>,
    /// `DATA` payloads dropped because no file was open.
    pub dropped_chunks: usize,
    /// The server closed the stream before `OVER`.
    pub truncated: bool,
}

impl ExchangeOutcome {
    /// Non-empty, non-comment lines of the message text.
    pub fn record_lines(&self) -> Vec<String> {
        self.message
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !is_comment_line(l))
            .map(str::to_string)
            .collect()
    }
}

/// A client session with one STP server.
pub struct Session {
    config: SessionConfig,
    connection: Option<Connection>,
    motd: Motd,
    files: FileMaterializer,
    messages: MessageAccumulator,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Create a disconnected session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            files: FileMaterializer::new(config.output_dir.clone()),
            messages: MessageAccumulator::with_echo(config.echo_messages),
            motd: Motd::default(),
            connection: None,
            config,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        if self.connection.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// Check whether the session is connected.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Message of the day received on connect.
    pub fn motd(&self) -> &str {
        &self.motd.text
    }

    /// Error the server sent instead of a message of the day.
    pub fn motd_error(&self) -> Option<&str> {
        self.motd.error.as_deref()
    }

    /// Files written by the last exchange.
    pub fn recent_files(&self) -> &[PathBuf] {
        self.files.recent_files()
    }

    /// Message text of the last exchange.
    pub fn message(&self) -> &str {
        self.messages.message()
    }

    /// Change the root directory for files of later exchanges.
    pub fn set_output_directory(&mut self, dir: impl AsRef<Path>) {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self.files.set_root(dir.as_ref());
    }

    /// Turn per-directive logging on or off.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.config.verbose = verbose;
    }

    /// Connect, handshake and read the message of the day.
    ///
    /// Calling this on a connected session does nothing.
    ///
    /// # Errors
    ///
    /// [`StpError::Handshake`] if the server does not acknowledge; the
    /// connection is closed and the session stays disconnected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            tracing::warn!("Already connected");
            return Ok(());
        }

        tracing::info!(host = %self.config.host, port = self.config.port, "connecting");
        let mut connection = Connection::connect_with_max_line_length(
            &self.config.host,
            self.config.port,
            self.config.max_line_length,
        )
        .await?;

        let setup = {
            let (reader, writer) = connection.halves_mut();
            match perform_handshake(reader, writer).await {
                Ok(()) => read_motd(reader).await,
                Err(e) => Err(e),
            }
        };

        let motd = match setup {
            Ok(motd) => motd,
            Err(e) => {
                tracing::error!("Connection setup failed: {}", e);
                connection.shutdown().await;
                return Err(e);
            }
        };

        if self.config.show_motd && !motd.text.is_empty() {
            if let Err(e) = write_stdout_text(&motd.text) {
                tracing::warn!("Failed to print message of the day: {}", e);
            }
        }
        if let Some(error) = &motd.error {
            if let Err(e) = write_stdout_line(error) {
                tracing::warn!("Failed to print server error: {}", e);
            }
        }

        tracing::info!(peer = connection.peer(), "connected");
        self.motd = motd;
        self.connection = Some(connection);
        Ok(())
    }

    /// Close the open output file and the connection.
    ///
    /// Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.files.finish_exchange() {
            tracing::warn!("Failed to close output file: {}", e);
        }
        if let Some(connection) = self.connection.take() {
            tracing::info!(peer = connection.peer(), "disconnecting");
            connection.shutdown().await;
        }
    }

    /// Send one command and process the response.
    ///
    /// # Errors
    ///
    /// [`StpError::NotConnected`] when disconnected; I/O or protocol errors
    /// that leave the stream unusable (the session is disconnected).
    pub async fn execute(&mut self, command: &Command) -> Result<ExchangeOutcome> {
        self.require_connected()?;
        self.begin_exchange();
        let mut outcome = ExchangeOutcome::default();
        self.exchange(command.as_str(), &mut outcome).await?;
        self.finish_outcome(&mut outcome);
        Ok(outcome)
    }

    /// Request triggered waveforms for each event id.
    ///
    /// Returns the materialized files per event. `format` is one of
    /// `sac`, `mseed`, `seed`, `ascii`, `v0`, `v1` (any case). Use
    /// [`Session::request_waveform_outcomes`] to also see server errors,
    /// file errors and dropped chunks per event.
    ///
    /// If the connection is lost during an event, the files of the events
    /// handled so far (including the interrupted one) are returned and the
    /// remaining events are not requested.
    ///
    /// # Errors
    ///
    /// [`StpError::InvalidFormat`] before any I/O for an unknown format,
    /// [`StpError::NotConnected`] when disconnected.
    pub async fn request_waveforms(
        &mut self,
        event_ids: &[u64],
        filter: &WaveformFilter,
        format: &str,
    ) -> Result<BTreeMap<u64, Vec<PathBuf>>> {
        let outcomes = self
            .request_waveform_outcomes(event_ids, filter, format)
            .await?;
        Ok(outcomes
            .into_iter()
            .map(|(event_id, outcome)| (event_id, outcome.files))
            .collect())
    }

    /// Request triggered waveforms and keep the full outcome of each event.
    ///
    /// Stops early, returning what was collected, when the connection is
    /// lost.
    pub async fn request_waveform_outcomes(
        &mut self,
        event_ids: &[u64],
        filter: &WaveformFilter,
        format: &str,
    ) -> Result<BTreeMap<u64, ExchangeOutcome>> {
        let format: DataFormat = format.parse()?;
        self.require_connected()?;

        let mut result = BTreeMap::new();
        for (done, &event_id) in event_ids.iter().enumerate() {
            let outcome = self.waveform_exchange(event_id, filter, format).await?;
            let truncated = outcome.truncated;
            result.insert(event_id, outcome);

            if truncated || !self.is_connected() {
                tracing::warn!(
                    event_id,
                    skipped = event_ids.len() - done - 1,
                    "Connection lost, returning partial waveform results"
                );
                break;
            }
        }
        Ok(result)
    }

    /// Request triggered waveforms and decode the files.
    ///
    /// Files the decoder does not recognize are skipped. Unless
    /// `keep_files` is set, each file is removed once read. A lost
    /// connection ends the request early, as for
    /// [`Session::request_waveforms`].
    pub async fn request_waveform_traces<D: WaveformDecoder>(
        &mut self,
        event_ids: &[u64],
        filter: &WaveformFilter,
        format: &str,
        decoder: &D,
        keep_files: bool,
    ) -> Result<BTreeMap<u64, WaveformResult<D::Trace>>> {
        let outcomes = self
            .request_waveform_outcomes(event_ids, filter, format)
            .await?;
        Ok(outcomes
            .into_iter()
            .map(|(event_id, outcome)| {
                (event_id, decode_files(decoder, outcome.files, keep_files))
            })
            .collect())
    }

    /// Request catalog events; returns the raw record lines.
    pub async fn request_events(&mut self, filter: &CatalogFilter) -> Result<Vec<String>> {
        let outcome = self.execute(&event_command(filter)).await?;
        Ok(outcome.record_lines())
    }

    /// Request events with phase picks; returns the raw record lines.
    pub async fn request_phases(&mut self, filter: &CatalogFilter) -> Result<Vec<String>> {
        let outcome = self.execute(&phase_command(filter)).await?;
        Ok(outcome.record_lines())
    }

    /// Request catalog events and decode them.
    ///
    /// # Errors
    ///
    /// [`StpError::MalformedRecord`] if any line fails to decode.
    pub async fn request_event_catalog<D: CatalogDecoder + ?Sized>(
        &mut self,
        filter: &CatalogFilter,
        decoder: &D,
    ) -> Result<Vec<EventRecord>> {
        let lines = self.request_events(filter).await?;
        lines.iter().map(|line| decoder.decode_event(line)).collect()
    }

    /// Request events with phase picks and decode them.
    ///
    /// # Errors
    ///
    /// [`StpError::MalformedRecord`] if any line fails to decode, or a pick
    /// arrives before its event.
    pub async fn request_phase_catalog<D: CatalogDecoder + ?Sized>(
        &mut self,
        filter: &CatalogFilter,
        decoder: &D,
    ) -> Result<Vec<PhaseRecord>> {
        let lines = self.request_phases(filter).await?;
        decode_phase_lines(decoder, lines)
    }

    /// Format exchange followed by the `trig` exchange for one event.
    async fn waveform_exchange(
        &mut self,
        event_id: u64,
        filter: &WaveformFilter,
        format: DataFormat,
    ) -> Result<ExchangeOutcome> {
        let command = trig_command(filter, event_id);
        if self.config.verbose {
            tracing::debug!(%format, %command, "Requesting waveforms");
        }

        self.begin_exchange();
        let mut outcome = ExchangeOutcome::default();
        self.exchange(format.as_str(), &mut outcome).await?;
        if !outcome.truncated {
            self.exchange(command.as_str(), &mut outcome).await?;
        }
        self.finish_outcome(&mut outcome);
        Ok(outcome)
    }

    fn require_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            tracing::warn!("STP is not connected");
            Err(StpError::NotConnected)
        }
    }

    fn begin_exchange(&mut self) {
        self.files.begin_exchange();
        self.messages.begin_exchange();
    }

    fn finish_outcome(&self, outcome: &mut ExchangeOutcome) {
        outcome.files = self.files.recent_files().to_vec();
        outcome.message = self.messages.message().to_string();
        outcome.dropped_chunks = self.files.dropped_chunks();
    }

    /// Send `line` and dispatch the response until `Over`.
    ///
    /// A stream that ends early disconnects the session but is not an
    /// error; any other read failure disconnects and is returned.
    async fn exchange(&mut self, line: &str, outcome: &mut ExchangeOutcome) -> Result<()> {
        let result = self.run_exchange(line, outcome).await;

        let close = match &result {
            Ok(truncated) => *truncated,
            Err(_) => true,
        };
        if close {
            if let Err(e) = self.files.finish_exchange() {
                tracing::warn!("Failed to close output file: {}", e);
            }
            if let Some(connection) = self.connection.take() {
                tracing::warn!(peer = connection.peer(), "Connection lost, disconnecting");
                connection.shutdown().await;
            }
        }

        let truncated = result?;
        outcome.truncated |= truncated;
        Ok(())
    }

    /// Returns whether the stream ended before `OVER`.
    async fn run_exchange(&mut self, line: &str, outcome: &mut ExchangeOutcome) -> Result<bool> {
        let verbose = self.config.verbose;
        let connection = self.connection.as_mut().ok_or(StpError::NotConnected)?;

        if verbose {
            tracing::debug!(command = line, "Sending command");
        }
        connection.send_line(line).await?;

        let mut decoder =
            ResponseDecoder::with_max_chunk_size(connection.reader_mut(), self.config.max_chunk_size);
        loop {
            let event = decoder.next_event().await?;
            if verbose {
                tracing::debug!(event = event.kind(), "Received directive");
            }

            if let ResponseEvent::Error(words) = &event {
                let text = words.join(" ");
                tracing::warn!(error = %text, "Server error");
                if let Err(e) = write_stdout_line(&text) {
                    tracing::warn!("Failed to print server error: {}", e);
                }
                outcome.server_errors.push(text);
            }

            if let Err(e) = self.files.handle(&event) {
                tracing::warn!("{}", e);
                outcome.file_errors.push(e);
            }
            self.messages.handle(&event)?;

            if event.is_over() {
                return Ok(decoder.was_truncated());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let session = Session::builder()
            .host("localhost")
            .port(1234)
            .output_dir("/tmp/out")
            .verbose(true)
            .show_motd(false)
            .echo_messages(false)
            .max_line_length(128)
            .max_chunk_size(4096)
            .build();

        let config = session.config();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1234);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert!(config.verbose);
        assert!(!config.show_motd);
        assert!(!config.echo_messages);
        assert_eq!(config.max_line_length, 128);
        assert_eq!(config.max_chunk_size, 4096);
    }

    #[test]
    fn test_builder_default() {
        let session = SessionBuilder::default().build();
        assert_eq!(session.config().host, DEFAULT_HOST);
        assert_eq!(session.config().port, DEFAULT_PORT);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.motd().is_empty());
    }

    #[test]
    fn test_setters() {
        let mut session = Session::builder().build();
        session.set_verbose(true);
        session.set_output_directory("/data/stp");
        assert!(session.config().verbose);
        assert_eq!(session.config().output_dir, PathBuf::from("/data/stp"));
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_safe() {
        let mut session = Session::builder().build();
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_requests_need_connection() {
        let mut session = Session::builder().build();

        let err = session
            .request_events(&CatalogFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StpError::NotConnected));

        let err = session
            .request_waveforms(&[1], &WaveformFilter::new(), "sac")
            .await
            .unwrap_err();
        assert!(matches!(err, StpError::NotConnected));
    }

    #[tokio::test]
    async fn test_invalid_format_checked_first() {
        let mut session = Session::builder().build();
        let err = session
            .request_waveforms(&[1], &WaveformFilter::new(), "xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, StpError::InvalidFormat(ref f) if f == "xyz"));
    }

    #[test]
    fn test_record_lines_skip_comments() {
        let outcome = ExchangeOutcome {
            message: "# EVID ETYPE\n\n 1 eq l x\n#more\n2 eq l y\n".to_string(),
            ..ExchangeOutcome::default()
        };
        assert_eq!(outcome.record_lines(), vec!["1 eq l x", "2 eq l y"]);
    }
}
