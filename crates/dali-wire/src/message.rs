//! Command and reply message types for the wire protocol.
//!
//! Headers are space-separated ASCII fields. Variable-length data (patterns,
//! packet payloads, server messages, XML documents) travels in the payload
//! and its size is always the last header field.

use std::fmt::Display;
use std::str::FromStr;

use bytes::Bytes;
use dali_types::{Cursor, InfoKind, Packet, PacketId, PacketTime, WritePacket};

use crate::capabilities::Capabilities;
use crate::error::{WireError, WireResult};
use crate::frame::Frame;

// ============================================================================
// Commands (client → server)
// ============================================================================

/// Where to place the server-side read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The packet identified by this exact (id, time) pair.
    Packet(Cursor),
    /// The oldest packet in the server's buffer.
    Earliest,
    /// The newest packet in the server's buffer.
    Latest,
}

/// A client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Client identification; also used as the keepalive while streaming.
    Identify { client_id: String },
    /// Replace the stream match pattern.
    Match { pattern: String },
    /// Replace the stream reject pattern.
    Reject { pattern: String },
    /// Set the read position.
    Position(Position),
    /// Set the read position to the first packet with data at or after a time.
    PositionAfter { data_time: PacketTime },
    /// Read one packet by ID.
    Read { packet_id: PacketId },
    /// Submit a packet. With `ack` the server confirms with `OK`.
    Write { packet: WritePacket, ack: bool },
    /// Request server information.
    Info {
        kind: InfoKind,
        pattern: Option<String>,
    },
    /// Enter streaming mode.
    StreamStart,
    /// Leave streaming mode.
    StreamStop,
}

impl Command {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Identify { .. } => "ID",
            Command::Match { .. } => "MATCH",
            Command::Reject { .. } => "REJECT",
            Command::Position(_) => "POSITION SET",
            Command::PositionAfter { .. } => "POSITION AFTER",
            Command::Read { .. } => "READ",
            Command::Write { .. } => "WRITE",
            Command::Info { .. } => "INFO",
            Command::StreamStart => "STREAM",
            Command::StreamStop => "ENDSTREAM",
        }
    }

    /// Encodes the command to a frame.
    pub fn to_frame(&self) -> WireResult<Frame> {
        match self {
            Command::Identify { client_id } => {
                check_token("client id", client_id)?;
                Frame::header_only(format!("ID {client_id}"))
            }
            Command::Match { pattern } => Frame::new(
                format!("MATCH {}", pattern.len()),
                Bytes::copy_from_slice(pattern.as_bytes()),
            ),
            Command::Reject { pattern } => Frame::new(
                format!("REJECT {}", pattern.len()),
                Bytes::copy_from_slice(pattern.as_bytes()),
            ),
            Command::Position(Position::Packet(cursor)) => Frame::header_only(format!(
                "POSITION SET {} {}",
                cursor.packet_id,
                cursor.packet_time.as_micros()
            )),
            Command::Position(Position::Earliest) => Frame::header_only("POSITION SET EARLIEST"),
            Command::Position(Position::Latest) => Frame::header_only("POSITION SET LATEST"),
            Command::PositionAfter { data_time } => {
                Frame::header_only(format!("POSITION AFTER {}", data_time.as_micros()))
            }
            Command::Read { packet_id } => Frame::header_only(format!("READ {packet_id}")),
            Command::Write { packet, ack } => {
                check_token("stream id", &packet.stream_id)?;
                Frame::new(
                    format!(
                        "WRITE {} {} {} {} {}",
                        packet.stream_id,
                        packet.data_start.as_micros(),
                        packet.data_end.as_micros(),
                        if *ack { 'A' } else { 'N' },
                        packet.payload.len()
                    ),
                    packet.payload.clone(),
                )
            }
            Command::Info { kind, pattern } => match pattern {
                Some(pattern) => {
                    check_token("info pattern", pattern)?;
                    Frame::header_only(format!("INFO {kind} {pattern}"))
                }
                None => Frame::header_only(format!("INFO {kind}")),
            },
            Command::StreamStart => Frame::header_only("STREAM"),
            Command::StreamStop => Frame::header_only("ENDSTREAM"),
        }
    }

    /// Decodes a command from a frame.
    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        let header = frame.header.as_str();
        let fields: Vec<&str> = header.split_ascii_whitespace().collect();

        match fields.as_slice() {
            ["ID", client_id] => Ok(Command::Identify {
                client_id: (*client_id).to_string(),
            }),
            ["MATCH", _] => Ok(Command::Match {
                pattern: payload_text(frame)?,
            }),
            ["REJECT", _] => Ok(Command::Reject {
                pattern: payload_text(frame)?,
            }),
            ["POSITION", "SET", "EARLIEST"] => Ok(Command::Position(Position::Earliest)),
            ["POSITION", "SET", "LATEST"] => Ok(Command::Position(Position::Latest)),
            ["POSITION", "SET", id, time] => Ok(Command::Position(Position::Packet(Cursor::new(
                parse_field(header, "packet id", id)?,
                micros_field(header, "packet time", time)?,
            )))),
            ["POSITION", "AFTER", time] => Ok(Command::PositionAfter {
                data_time: micros_field(header, "data time", time)?,
            }),
            ["READ", id] => Ok(Command::Read {
                packet_id: parse_field(header, "packet id", id)?,
            }),
            ["WRITE", stream_id, start, end, flags, _] => Ok(Command::Write {
                packet: WritePacket::new(
                    *stream_id,
                    micros_field(header, "data start", start)?,
                    micros_field(header, "data end", end)?,
                    frame.payload.clone(),
                ),
                ack: match *flags {
                    "A" => true,
                    "N" => false,
                    other => {
                        return Err(WireError::malformed(header, format!("invalid flags {other:?}")));
                    }
                },
            }),
            ["INFO", kind] => Ok(Command::Info {
                kind: parse_field(header, "info kind", kind)?,
                pattern: None,
            }),
            ["INFO", kind, pattern] => Ok(Command::Info {
                kind: parse_field(header, "info kind", kind)?,
                pattern: Some((*pattern).to_string()),
            }),
            ["STREAM"] => Ok(Command::StreamStart),
            ["ENDSTREAM"] => Ok(Command::StreamStop),
            _ => Err(WireError::UnknownMessage(header.to_string())),
        }
    }
}

// ============================================================================
// Replies (server → client)
// ============================================================================

/// A server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Server identification; answers both the handshake and keepalives.
    Id {
        /// Server software description, e.g. `DataLink 2020.075`.
        server: String,
        capabilities: Capabilities,
    },
    /// Success. `value` depends on the command (packet ID, match count).
    Ok { value: i64, message: String },
    /// Failure. `value` is a server-defined code.
    Error { value: i64, message: String },
    /// A data packet.
    Packet(Packet),
    /// Server information as an XML document.
    Info { kind: InfoKind, xml: String },
    /// Acknowledges the end of streaming.
    EndStream,
}

impl Reply {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Reply::Id { .. } => "ID",
            Reply::Ok { .. } => "OK",
            Reply::Error { .. } => "ERROR",
            Reply::Packet(_) => "PACKET",
            Reply::Info { .. } => "INFO",
            Reply::EndStream => "ENDSTREAM",
        }
    }

    /// Encodes the reply to a frame.
    pub fn to_frame(&self) -> WireResult<Frame> {
        match self {
            Reply::Id {
                server,
                capabilities,
            } => {
                let capabilities = capabilities.to_string();
                if capabilities.is_empty() {
                    Frame::header_only(format!("ID {server}"))
                } else {
                    Frame::header_only(format!("ID {server} :: {capabilities}"))
                }
            }
            Reply::Ok { value, message } => text_frame("OK", *value, message),
            Reply::Error { value, message } => text_frame("ERROR", *value, message),
            Reply::Packet(packet) => {
                check_token("stream id", &packet.stream_id)?;
                Frame::new(
                    format!(
                        "PACKET {} {} {} {} {} {}",
                        packet.stream_id,
                        packet.id,
                        packet.time.as_micros(),
                        packet.data_start.as_micros(),
                        packet.data_end.as_micros(),
                        packet.payload.len()
                    ),
                    packet.payload.clone(),
                )
            }
            Reply::Info { kind, xml } => Frame::new(
                format!("INFO {kind} {}", xml.len()),
                Bytes::copy_from_slice(xml.as_bytes()),
            ),
            Reply::EndStream => Frame::header_only("ENDSTREAM"),
        }
    }

    /// Decodes a reply from a frame.
    pub fn from_frame(frame: &Frame) -> WireResult<Self> {
        let header = frame.header.as_str();

        if frame.keyword() == "ID" {
            return Ok(parse_id(header));
        }

        let fields: Vec<&str> = header.split_ascii_whitespace().collect();
        match fields.as_slice() {
            ["OK", value, _] => Ok(Reply::Ok {
                value: parse_field(header, "value", value)?,
                message: payload_text_lossy(frame),
            }),
            ["ERROR", value, _] => Ok(Reply::Error {
                value: parse_field(header, "value", value)?,
                message: payload_text_lossy(frame),
            }),
            ["PACKET", stream_id, id, time, start, end, _] => Ok(Reply::Packet(Packet {
                stream_id: (*stream_id).to_string(),
                id: parse_field(header, "packet id", id)?,
                time: micros_field(header, "packet time", time)?,
                data_start: micros_field(header, "data start", start)?,
                data_end: micros_field(header, "data end", end)?,
                payload: frame.payload.clone(),
            })),
            ["INFO", kind, _] => Ok(Reply::Info {
                kind: parse_field(header, "info kind", kind)?,
                xml: payload_text(frame)?,
            }),
            ["ENDSTREAM"] => Ok(Reply::EndStream),
            _ => Err(WireError::UnknownMessage(header.to_string())),
        }
    }
}

/// Splits `ID <server> :: <capabilities>`.
fn parse_id(header: &str) -> Reply {
    let body = header.strip_prefix("ID").unwrap_or(header).trim();
    let (server, capabilities) = match body.split_once("::") {
        Some((server, capabilities)) => (server.trim(), Capabilities::parse(capabilities)),
        None => (body, Capabilities::default()),
    };

    Reply::Id {
        server: server.to_string(),
        capabilities,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn text_frame(keyword: &str, value: i64, message: &str) -> WireResult<Frame> {
    Frame::new(
        format!("{keyword} {value} {}", message.len()),
        Bytes::copy_from_slice(message.as_bytes()),
    )
}

/// A header field must be a single non-empty word.
fn check_token(field: &'static str, value: &str) -> WireResult<()> {
    if value.is_empty() || !value.is_ascii() || value.contains(|c: char| c.is_ascii_whitespace()) {
        return Err(WireError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn parse_field<T>(header: &str, field: &str, value: &str) -> WireResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| WireError::malformed(header, format!("{field}: {e}")))
}

fn micros_field(header: &str, field: &str, value: &str) -> WireResult<PacketTime> {
    value
        .parse::<i64>()
        .map(PacketTime::from_micros)
        .map_err(|_| WireError::malformed(header, format!("{field}: {value:?} is not an integer")))
}

fn trim_nul(payload: &[u8]) -> &[u8] {
    let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &payload[..end]
}

fn payload_text(frame: &Frame) -> WireResult<String> {
    String::from_utf8(trim_nul(&frame.payload).to_vec())
        .map_err(|_| WireError::malformed(&frame.header, "payload is not UTF-8"))
}

fn payload_text_lossy(frame: &Frame) -> String {
    String::from_utf8_lossy(trim_nul(&frame.payload)).into_owned()
}
