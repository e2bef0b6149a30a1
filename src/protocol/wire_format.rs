//! Wire format constants.
//!
//! The STP protocol is line oriented ASCII with embedded binary payloads:
//! ```text
//! client: STP stpisgreat 1.6.3 stpc\n
//! server: CONNECTED\n
//! client: <u32 = 2, native endian>          (4 raw bytes)
//! server: MESS\n ...motd... ENDmess\n OVER\n
//!
//! client: sac\n                              (format exchange)
//! server: OVER\n
//! client: trig -net CI 12345\n               (request exchange)
//! server: DIR 12345\n FILE a.sac\n DATA 3\n <3 bytes> ENDdata\n OVER\n
//! ```
//!
//! Only the bytes announced by `DATA <n>` are raw; everything else is a
//! newline-terminated line.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StpError;

/// Handshake line sent by the client right after connecting.
pub const HANDSHAKE: &[u8] = b"STP stpisgreat 1.6.3 stpc\n";

/// Acknowledgement line the server sends back on a good handshake.
pub const HANDSHAKE_ACK: &str = "CONNECTED";

/// Integer the client sends so the server can detect its byte order.
pub const ENDIAN_PROBE: u32 = 2;

/// Default maximum length of a single line (64 KB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default maximum size of a single `DATA` payload (1 GB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1_073_741_824;

/// Server directive tokens (first word of a line, case-sensitive).
pub mod tokens {
    /// End of the current exchange.
    pub const OVER: &str = "OVER";
    /// Open a new output file: `FILE <name>`.
    pub const FILE: &str = "FILE";
    /// Descend into an output directory: `DIR <name>`.
    pub const DIR: &str = "DIR";
    /// Start of a free-text message block.
    pub const MESS: &str = "MESS";
    /// End of a free-text message block.
    pub const END_MESS: &str = "ENDmess";
    /// Raw payload follows: `DATA <n>`.
    pub const DATA: &str = "DATA";
    /// Marker after the last payload of a file.
    pub const END_DATA: &str = "ENDdata";
    /// Server-side error: `ERR <words...>`.
    pub const ERR: &str = "ERR";
}

/// Encode the endianness probe as the server expects it.
#[inline]
pub fn encode_endian_probe() -> [u8; 4] {
    ENDIAN_PROBE.to_ne_bytes()
}

/// Waveform output formats the server can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Sac,
    Mseed,
    Seed,
    Ascii,
    V0,
    V1,
}

impl DataFormat {
    /// All recognized formats.
    pub const ALL: [DataFormat; 6] = [
        DataFormat::Sac,
        DataFormat::Mseed,
        DataFormat::Seed,
        DataFormat::Ascii,
        DataFormat::V0,
        DataFormat::V1,
    ];

    /// Token sent on the wire to select this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Sac => "sac",
            DataFormat::Mseed => "mseed",
            DataFormat::Seed => "seed",
            DataFormat::Ascii => "ascii",
            DataFormat::V0 => "v0",
            DataFormat::V1 => "v1",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = StpError;

    /// Parse a format token, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        DataFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == lower)
            .ok_or_else(|| StpError::InvalidFormat(s.to_string()))
    }
}
