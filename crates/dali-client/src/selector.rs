//! Stream selection and positioning.
//!
//! All of these are query-mode operations. A failed call changes no local
//! state, so the session stays usable after a rejected pattern or a missing
//! position target.

use dali_types::{Cursor, PacketId, PacketTime};
use dali_wire::{Command, Position, Reply};

use crate::error::{ClientError, ClientResult};
use crate::session::Session;
use crate::sink::Level;

impl Session {
    /// Replaces the match pattern. Returns the number of streams the server
    /// reports as matching.
    pub fn set_match(&mut self, pattern: &str) -> ClientResult<usize> {
        self.require_query_mode("match")?;
        self.submit_pattern(Command::Match {
            pattern: pattern.to_string(),
        })
    }

    /// Replaces the reject pattern. Returns the number of streams the server
    /// reports as matching.
    pub fn set_reject(&mut self, pattern: &str) -> ClientResult<usize> {
        self.require_query_mode("reject")?;
        self.submit_pattern(Command::Reject {
            pattern: pattern.to_string(),
        })
    }

    /// Positions the server at the packet with exactly this ID and time.
    pub fn position(&mut self, packet_id: PacketId, packet_time: PacketTime) -> ClientResult<PacketId> {
        self.require_query_mode("position")?;
        self.submit_position(Command::Position(Position::Packet(Cursor::new(
            packet_id,
            packet_time,
        ))))
    }

    /// Positions the server at the first packet whose data starts at or
    /// after `data_time`.
    pub fn position_after(&mut self, data_time: PacketTime) -> ClientResult<PacketId> {
        self.require_query_mode("position")?;
        self.submit_position(Command::PositionAfter { data_time })
    }

    /// Positions the server at the oldest packet it holds.
    pub fn position_earliest(&mut self) -> ClientResult<PacketId> {
        self.require_query_mode("position")?;
        self.submit_position(Command::Position(Position::Earliest))
    }

    /// Positions the server at the newest packet it holds.
    pub fn position_latest(&mut self) -> ClientResult<PacketId> {
        self.require_query_mode("position")?;
        self.submit_position(Command::Position(Position::Latest))
    }

    fn submit_pattern(&mut self, command: Command) -> ClientResult<usize> {
        match self.request(&command)? {
            Reply::Ok { value, .. } => {
                let matched = usize::try_from(value).unwrap_or(0);
                self.log(
                    Level::Debug,
                    format_args!("{} accepted, {matched} streams", command.name()),
                );
                Ok(matched)
            }
            Reply::Error { message, .. } => {
                self.log(
                    Level::Error,
                    format_args!("{} rejected: {message}", command.name()),
                );
                Err(ClientError::InvalidPattern(message))
            }
            other => Err(ClientError::UnexpectedReply {
                expected: "OK",
                actual: other.name(),
            }),
        }
    }

    fn submit_position(&mut self, command: Command) -> ClientResult<PacketId> {
        match self.request(&command)? {
            Reply::Ok { value, .. } => {
                let packet_id = PacketId::new(value);
                self.log(Level::Debug, format_args!("positioned at packet {packet_id}"));
                Ok(packet_id)
            }
            Reply::Error { message, .. } => {
                self.log(
                    Level::Debug,
                    format_args!("{} failed: {message}", command.name()),
                );
                Err(ClientError::NotFound(message))
            }
            other => Err(ClientError::UnexpectedReply {
                expected: "OK",
                actual: other.name(),
            }),
        }
    }
}
