//! # dali-types: Core types for the `DataLink` client
//!
//! This crate contains the value types shared by the wire codec and the
//! client:
//! - Packet positioning ([`PacketId`], [`PacketTime`], [`Cursor`])
//! - Packets ([`Packet`], [`WritePacket`])
//! - Server information requests ([`InfoKind`])

use std::{fmt::Display, str::FromStr};

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a type from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid packet id: {0:?}")]
    PacketId(String),

    #[error("invalid packet time: {0:?}")]
    PacketTime(String),

    #[error("invalid cursor: {0}")]
    Cursor(String),

    #[error("unknown info kind: {0:?} (expected STATUS, STREAMS or CONNECTIONS)")]
    InfoKind(String),
}

// ============================================================================
// Packet ID - Copy (8-byte value)
// ============================================================================

/// Server-assigned packet identifier.
///
/// IDs are unique within one server instance's lifetime only. A server
/// restart may reuse IDs, which is why a [`Cursor`] always pairs the ID with
/// the packet time.
///
/// Negative values are reserved for the positioning sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PacketId(i64);

impl PacketId {
    /// No packet received yet.
    pub const NONE: PacketId = PacketId(-1);
    /// Position at the oldest packet in the server's buffer.
    pub const EARLIEST: PacketId = PacketId(-2);
    /// Position at the newest packet in the server's buffer.
    pub const LATEST: PacketId = PacketId(-3);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Returns true for IDs the server can actually assign to a packet.
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl Default for PacketId {
    fn default() -> Self {
        Self::NONE
    }
}

impl Display for PacketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PacketId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| ParseError::PacketId(s.to_string()))
    }
}

impl From<i64> for PacketId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<PacketId> for i64 {
    fn from(id: PacketId) -> Self {
        id.0
    }
}

// ============================================================================
// Packet Time - Copy (microseconds since the Unix epoch)
// ============================================================================

/// High-precision timestamp: microseconds since 1970-01-01T00:00:00Z.
///
/// Used both for the server-assigned packet creation time and for the data
/// time span a packet covers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PacketTime(i64);

impl PacketTime {
    pub const ZERO: PacketTime = PacketTime(0);

    /// Microseconds per second.
    pub const MODULUS: i64 = 1_000_000;

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        Self(time.timestamp_micros())
    }

    /// Converts to a calendar time, or `None` if out of chrono's range.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_micros(self.0)
    }

    /// Formats as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.
    pub fn to_iso_string(&self) -> String {
        match self.to_datetime() {
            Some(time) => time.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            None => self.0.to_string(),
        }
    }
}

impl Display for PacketTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso_string())
    }
}

/// Accepts raw microseconds, RFC 3339, or a zone-less ISO timestamp
/// (interpreted as UTC).
impl FromStr for PacketTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(micros) = s.parse::<i64>() {
            return Ok(Self(micros));
        }
        if let Ok(time) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::from_datetime(time.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Self::from_datetime(naive.and_utc()))
            .map_err(|_| ParseError::PacketTime(s.to_string()))
    }
}

impl From<DateTime<Utc>> for PacketTime {
    fn from(time: DateTime<Utc>) -> Self {
        Self::from_datetime(time)
    }
}

// ============================================================================
// Cursor - Copy (durable read position)
// ============================================================================

/// A client's durable read position: the last packet received.
///
/// The textual form, `<packet_id> <packet_time_micros>`, is the state file
/// record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub packet_id: PacketId,
    pub packet_time: PacketTime,
}

impl Cursor {
    pub fn new(packet_id: PacketId, packet_time: PacketTime) -> Self {
        Self {
            packet_id,
            packet_time,
        }
    }

    /// True once at least one packet has been seen.
    pub fn is_set(&self) -> bool {
        self.packet_id.is_valid()
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new(PacketId::NONE, PacketTime::ZERO)
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.packet_id, self.packet_time.as_micros())
    }
}

impl FromStr for Cursor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        let (Some(id), Some(time), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(ParseError::Cursor(format!(
                "expected \"<packet_id> <packet_time>\", got {s:?}"
            )));
        };

        let packet_id = id.parse::<PacketId>()?;
        let packet_time = time
            .parse::<i64>()
            .map(PacketTime::from_micros)
            .map_err(|_| ParseError::PacketTime(time.to_string()))?;

        Ok(Self::new(packet_id, packet_time))
    }
}

// ============================================================================
// Packets - Clone (payload is reference-counted Bytes)
// ============================================================================

/// A data packet received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Stream the packet belongs to, e.g. `IU_ANMO_00_BHZ/MSEED`.
    pub stream_id: String,
    /// Server-assigned packet ID.
    pub id: PacketId,
    /// Time the server created the packet.
    pub time: PacketTime,
    /// Start of the data time span.
    pub data_start: PacketTime,
    /// End of the data time span.
    pub data_end: PacketTime,
    /// Packet payload.
    pub payload: Bytes,
}

impl Packet {
    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// The cursor pointing at this packet.
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.id, self.time)
    }
}

/// A packet the client submits to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePacket {
    pub stream_id: String,
    pub data_start: PacketTime,
    pub data_end: PacketTime,
    pub payload: Bytes,
}

impl WritePacket {
    pub fn new(
        stream_id: impl Into<String>,
        data_start: PacketTime,
        data_end: PacketTime,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            data_start,
            data_end,
            payload: payload.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

// ============================================================================
// Info Kind - Copy (simple enum)
// ============================================================================

/// The kind of server information requested with `INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InfoKind {
    /// Server and session status.
    Status,
    /// Streams visible through the current match/reject filters.
    Streams,
    /// Other connected clients.
    Connections,
}

impl InfoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoKind::Status => "STATUS",
            InfoKind::Streams => "STREAMS",
            InfoKind::Connections => "CONNECTIONS",
        }
    }
}

impl Display for InfoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfoKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STATUS" => Ok(InfoKind::Status),
            "STREAMS" => Ok(InfoKind::Streams),
            "CONNECTIONS" => Ok(InfoKind::Connections),
            _ => Err(ParseError::InfoKind(s.to_string())),
        }
    }
}
