//! Command builder - renders request filters into STP command lines.
//!
//! Each filter that is set appends one `-<flag> <value...>` fragment; unset
//! filters contribute nothing, which the server reads as a wildcard.
//! Fragments are always emitted in the same order:
//!
//! - `trig`: `-net -sta -chan -loc -radius <evid>`
//! - `event`/`phase`: `-f -e -t0 -lat -lon -mag -depth -type -gtype`
//!
//! # Example
//!
//! ```
//! use stp_client::codec::{trig_command, WaveformFilter};
//!
//! let filter = WaveformFilter::new().network("CI").station("PAS");
//! assert_eq!(trig_command(&filter, 12345).as_str(), "trig -net CI -sta PAS 12345");
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side wildcard; treated the same as an unset filter.
pub const WILDCARD: &str = "%";

/// Time format used by the server: `YYYY/MM/DD,HH:MM:SS.ffffff` (UTC).
pub const TIME_FORMAT: &str = "%Y/%m/%d,%H:%M:%S%.6f";

/// A rendered command line (without the trailing newline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    /// Command text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the command contains `fragment` as whole words.
    pub fn contains(&self, fragment: &str) -> bool {
        let words: Vec<&str> = self.0.split_whitespace().collect();
        let needle: Vec<&str> = fragment.split_whitespace().collect();
        !needle.is_empty() && words.windows(needle.len()).any(|w| w == needle.as_slice())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Channel filters for waveform (`trig`) requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveformFilter {
    pub network: Option<String>,
    pub station: Option<String>,
    pub channel: Option<String>,
    pub location: Option<String>,
    /// Station radius around the event epicenter, km.
    pub radius: Option<f64>,
}

impl WaveformFilter {
    /// Empty filter (all channels).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn station(mut self, station: impl Into<String>) -> Self {
        self.station = Some(station.into());
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }
}

/// Selection for `event` and `phase` requests.
///
/// When `event_ids` is set the server selects by id only, so the range and
/// type filters are not rendered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub event_ids: Option<Vec<u64>>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub latitude: Option<(f64, f64)>,
    pub longitude: Option<(f64, f64)>,
    pub magnitude: Option<(f64, f64)>,
    pub depth: Option<(f64, f64)>,
    /// Event type codes (`eq`, `qb`, ...).
    pub event_types: Option<Vec<String>>,
    /// Geographic/generation type codes.
    pub generation_types: Option<Vec<String>>,
    /// Ask the server to also write the result to this file on its side.
    pub output_file: Option<String>,
}

impl CatalogFilter {
    /// Empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.event_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_range = Some((start, end));
        self
    }

    pub fn latitude(mut self, min: f64, max: f64) -> Self {
        self.latitude = Some((min, max));
        self
    }

    pub fn longitude(mut self, min: f64, max: f64) -> Self {
        self.longitude = Some((min, max));
        self
    }

    pub fn magnitude(mut self, min: f64, max: f64) -> Self {
        self.magnitude = Some((min, max));
        self
    }

    pub fn depth(mut self, min: f64, max: f64) -> Self {
        self.depth = Some((min, max));
        self
    }

    pub fn event_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn generation_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generation_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn output_file(mut self, name: impl Into<String>) -> Self {
        self.output_file = Some(name.into());
        self
    }
}

/// Format a timestamp the way the server expects.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Render a `trig` command for one event.
pub fn trig_command(filter: &WaveformFilter, event_id: u64) -> Command {
    let mut cmd = CommandLine::new("trig");
    cmd.text("-net", filter.network.as_deref());
    cmd.text("-sta", filter.station.as_deref());
    cmd.text("-chan", filter.channel.as_deref());
    cmd.text("-loc", filter.location.as_deref());
    if let Some(radius) = filter.radius {
        cmd.flag("-radius", format_args!("{}", radius));
    }
    cmd.word(event_id);
    cmd.finish()
}

/// Render an `event` command.
pub fn event_command(filter: &CatalogFilter) -> Command {
    catalog_command("event", filter)
}

/// Render a `phase` command.
pub fn phase_command(filter: &CatalogFilter) -> Command {
    catalog_command("phase", filter)
}

fn catalog_command(verb: &str, filter: &CatalogFilter) -> Command {
    let mut cmd = CommandLine::new(verb);
    cmd.text("-f", filter.output_file.as_deref());

    if let Some(ids) = &filter.event_ids {
        cmd.list("-e", ids, " ");
        return cmd.finish();
    }

    if let Some((start, end)) = &filter.time_range {
        cmd.flag(
            "-t0",
            format_args!("{} {}", format_time(start), format_time(end)),
        );
    }
    cmd.range("-lat", filter.latitude);
    cmd.range("-lon", filter.longitude);
    cmd.range("-mag", filter.magnitude);
    cmd.range("-depth", filter.depth);
    if let Some(types) = &filter.event_types {
        cmd.list("-type", types, ",");
    }
    if let Some(types) = &filter.generation_types {
        cmd.list("-gtype", types, ",");
    }
    cmd.finish()
}

/// Accumulates space-separated command words.
struct CommandLine {
    buf: String,
}

impl CommandLine {
    fn new(verb: &str) -> Self {
        Self {
            buf: verb.to_string(),
        }
    }

    fn word(&mut self, word: impl fmt::Display) {
        self.buf.push(' ');
        self.buf.push_str(&word.to_string());
    }

    fn flag(&mut self, flag: &str, value: fmt::Arguments<'_>) {
        self.buf.push_str(&format!(" {} {}", flag, value));
    }

    fn text(&mut self, flag: &str, value: Option<&str>) {
        match value {
            Some(v) if !v.is_empty() && v != WILDCARD => self.flag(flag, format_args!("{}", v)),
            _ => {}
        }
    }

    fn range(&mut self, flag: &str, range: Option<(f64, f64)>) {
        if let Some((low, high)) = range {
            self.flag(flag, format_args!("{} {}", low, high));
        }
    }

    fn list<T: fmt::Display>(&mut self, flag: &str, items: &[T], sep: &str) {
        if items.is_empty() {
            return;
        }
        let joined = items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(sep);
        self.flag(flag, format_args!("{}", joined));
    }

    fn finish(self) -> Command {
        Command(self.buf)
    }
}
