//! Catalog decoding - typed records from `event` and `phase` text lines.
//!
//! The session hands over raw, non-comment lines; a [`CatalogDecoder`]
//! turns them into [`EventRecord`]s and [`PickRecord`]s. The default
//! [`StpCatalogDecoder`] reads the server's whitespace-separated layouts:
//!
//! ```text
//! event: EVID ETYPE GTYPE YYYY/MM/DD,HH:MM:SS.fff LAT LON DEPTH MAG MAGTYPE ...
//! pick:  NET STA CHAN LOC LAT LON ELEV PHASE POLARITY ONSET QUALITY DIST OFFSET
//! ```

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StpError};

/// Time format of event origin times.
const ORIGIN_TIME_FORMAT: &str = "%Y/%m/%d,%H:%M:%S%.f";

/// Event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Earthquake,
    QuarryBlast,
    SonicBoom,
    NuclearBlast,
    NotReported,
}

impl EventType {
    /// Parse a server type code (`eq`, `qb`, `sn`, `nt`, `uk`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "eq" => Some(EventType::Earthquake),
            "qb" => Some(EventType::QuarryBlast),
            "sn" => Some(EventType::SonicBoom),
            "nt" => Some(EventType::NuclearBlast),
            "uk" => Some(EventType::NotReported),
            _ => None,
        }
    }

    /// Human readable name.
    pub fn description(&self) -> &'static str {
        match self {
            EventType::Earthquake => "earthquake",
            EventType::QuarryBlast => "quarry blast",
            EventType::SonicBoom => "sonic boom",
            EventType::NuclearBlast => "nuclear blast",
            EventType::NotReported => "not reported",
        }
    }
}

/// Magnitude scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MagnitudeType {
    Mb,
    Me,
    Ml,
    Ms,
    Mc,
    None,
    Mw,
    Mh,
    Md,
    Mlr,
}

impl MagnitudeType {
    /// Parse a server magnitude code (`b e l s c n w h d lr`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "b" => Some(MagnitudeType::Mb),
            "e" => Some(MagnitudeType::Me),
            "l" => Some(MagnitudeType::Ml),
            "s" => Some(MagnitudeType::Ms),
            "c" => Some(MagnitudeType::Mc),
            "n" => Some(MagnitudeType::None),
            "w" => Some(MagnitudeType::Mw),
            "h" => Some(MagnitudeType::Mh),
            "d" => Some(MagnitudeType::Md),
            "lr" => Some(MagnitudeType::Mlr),
            _ => None,
        }
    }

    /// Conventional label (`ML`, `Mw`, ...); empty for [`MagnitudeType::None`].
    pub fn label(&self) -> &'static str {
        match self {
            MagnitudeType::Mb => "Mb",
            MagnitudeType::Me => "Me",
            MagnitudeType::Ml => "ML",
            MagnitudeType::Ms => "MS",
            MagnitudeType::Mc => "Mc",
            MagnitudeType::None => "",
            MagnitudeType::Mw => "Mw",
            MagnitudeType::Mh => "Mh",
            MagnitudeType::Md => "Md",
            MagnitudeType::Mlr => "Mlr",
        }
    }
}

/// One catalog event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub event_type: EventType,
    pub origin_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Depth, km.
    pub depth: f64,
    pub magnitude: f64,
    pub magnitude_type: MagnitudeType,
}

/// One phase pick, relative to its event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickRecord {
    pub network: String,
    pub station: String,
    pub channel: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    /// Phase name (`P`, `S`, ...).
    pub phase: String,
    /// First-motion code as sent by the server (`c.`, `d.`, `..`).
    pub polarity: String,
    /// Onset code (`i`, `e`, `w`).
    pub onset: String,
    pub quality: f64,
    /// Epicentral distance, km.
    pub distance: f64,
    /// Seconds after the event origin.
    pub time_offset: f64,
    /// Origin time plus `time_offset`.
    pub time: DateTime<Utc>,
}

/// An event with the picks that followed it in a `phase` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub event: EventRecord,
    pub picks: Vec<PickRecord>,
}

/// Turns catalog text lines into typed records.
pub trait CatalogDecoder {
    /// Decode one event line.
    fn decode_event(&self, line: &str) -> Result<EventRecord>;

    /// Decode one pick line belonging to an event with the given origin time.
    fn decode_pick(&self, line: &str, origin_time: DateTime<Utc>) -> Result<PickRecord>;
}

/// Decoder for the STP text layouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct StpCatalogDecoder;

impl CatalogDecoder for StpCatalogDecoder {
    fn decode_event(&self, line: &str) -> Result<EventRecord> {
        let fields = split_fields(line, 9)?;

        let id = parse_field(line, fields[0], "event id")?;
        let event_type = EventType::from_code(fields[1])
            .ok_or_else(|| StpError::malformed(line, format!("unknown event type {:?}", fields[1])))?;
        let origin_time = NaiveDateTime::parse_from_str(fields[3], ORIGIN_TIME_FORMAT)
            .map_err(|e| StpError::malformed(line, format!("bad origin time: {}", e)))?
            .and_utc();
        let magnitude_type = MagnitudeType::from_code(fields[8]).ok_or_else(|| {
            StpError::malformed(line, format!("unknown magnitude type {:?}", fields[8]))
        })?;

        Ok(EventRecord {
            id,
            event_type,
            origin_time,
            latitude: parse_field(line, fields[4], "latitude")?,
            longitude: parse_field(line, fields[5], "longitude")?,
            depth: parse_field(line, fields[6], "depth")?,
            magnitude: parse_field(line, fields[7], "magnitude")?,
            magnitude_type,
        })
    }

    fn decode_pick(&self, line: &str, origin_time: DateTime<Utc>) -> Result<PickRecord> {
        let fields = split_fields(line, 13)?;

        let time_offset: f64 = parse_field(line, fields[12], "time offset")?;
        let time = offset_time(origin_time, time_offset)
            .ok_or_else(|| StpError::malformed(line, "time offset out of range"))?;

        Ok(PickRecord {
            network: fields[0].to_string(),
            station: fields[1].to_string(),
            channel: fields[2].to_string(),
            location: fields[3].to_string(),
            latitude: parse_field(line, fields[4], "latitude")?,
            longitude: parse_field(line, fields[5], "longitude")?,
            elevation: parse_field(line, fields[6], "elevation")?,
            phase: fields[7].to_string(),
            polarity: fields[8].to_string(),
            onset: fields[9].to_string(),
            quality: parse_field(line, fields[10], "quality")?,
            distance: parse_field(line, fields[11], "distance")?,
            time_offset,
            time,
        })
    }
}

/// Check whether a `phase` response line starts a new event.
///
/// Event lines begin with the numeric event id; pick lines with a network
/// code.
pub fn is_event_line(line: &str) -> bool {
    matches!(line.trim_start().as_bytes().first(), Some(b'1'..=b'9'))
}

/// Check whether a catalog line is a comment.
pub fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Group `phase` response lines into events with their picks.
///
/// # Errors
///
/// [`StpError::MalformedRecord`] for a pick before any event, or any line
/// the decoder rejects.
pub fn decode_phase_lines<D, I, S>(decoder: &D, lines: I) -> Result<Vec<PhaseRecord>>
where
    D: CatalogDecoder + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records: Vec<PhaseRecord> = Vec::new();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() || is_comment_line(line) {
            continue;
        }

        if is_event_line(line) {
            records.push(PhaseRecord {
                event: decoder.decode_event(line)?,
                picks: Vec::new(),
            });
            continue;
        }

        let Some(current) = records.last_mut() else {
            return Err(StpError::malformed(line, "pick before any event"));
        };
        let pick = decoder.decode_pick(line, current.event.origin_time)?;
        current.picks.push(pick);
    }

    Ok(records)
}

/// Origin time shifted by `seconds`, or `None` if the result is not representable.
fn offset_time(origin_time: DateTime<Utc>, seconds: f64) -> Option<DateTime<Utc>> {
    let micros = (seconds * 1e6).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    origin_time.checked_add_signed(Duration::microseconds(micros as i64))
}

fn split_fields(line: &str, min: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < min {
        return Err(StpError::malformed(
            line,
            format!("expected at least {} fields, found {}", min, fields.len()),
        ));
    }
    Ok(fields)
}

fn parse_field<T: std::str::FromStr>(line: &str, field: &str, name: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| StpError::malformed(line, format!("bad {} {:?}", name, field)))
}
