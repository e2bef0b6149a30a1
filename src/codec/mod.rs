//! Codec module - rendering requests and decoding results.
//!
//! - [`command`](self::command) - filters to `trig`/`event`/`phase` command lines
//! - [`catalog`](self::catalog) - event and pick text lines to typed records
//! - [`waveform`](self::waveform) - seam for reading materialized waveform files
//!
//! # Example
//!
//! ```
//! use stp_client::codec::{event_command, CatalogDecoder, CatalogFilter, StpCatalogDecoder};
//!
//! let cmd = event_command(&CatalogFilter::new().event_ids([37301704]));
//! assert_eq!(cmd.as_str(), "event -e 37301704");
//!
//! let event = StpCatalogDecoder
//!     .decode_event("37301704 eq l 2020/01/02,03:04:05.250 33.95 -117.76 14.7 4.5 w")
//!     .unwrap();
//! assert_eq!(event.id, 37301704);
//! ```

pub mod catalog;
pub mod command;
pub mod waveform;

pub use catalog::{
    decode_phase_lines, CatalogDecoder, EventRecord, EventType, MagnitudeType, PhaseRecord,
    PickRecord, StpCatalogDecoder,
};
pub use command::{
    event_command, format_time, phase_command, trig_command, CatalogFilter, Command,
    WaveformFilter,
};
pub use waveform::{decode_files, WaveformDecodeError, WaveformDecoder, WaveformResult};
