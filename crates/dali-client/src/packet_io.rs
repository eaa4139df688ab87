//! Request/response packet I/O: read, write and server information.

use dali_types::{InfoKind, Packet, PacketId, WritePacket};
use dali_wire::{Command, Reply};

use crate::channel::Io;
use crate::error::{ClientError, ClientResult};
use crate::session::Session;
use crate::sink::Level;

impl Session {
    /// Reads one packet by ID.
    ///
    /// With `stream_id`, a packet from any other stream is reported as
    /// [`ClientError::NotFound`]. On success the cursor moves to the packet.
    pub fn read(&mut self, stream_id: Option<&str>, packet_id: PacketId) -> ClientResult<Packet> {
        self.require_query_mode("read")?;

        let reply = self.request(&Command::Read { packet_id })?;
        let packet = match reply {
            Reply::Packet(packet) => packet,
            Reply::Error { message, .. } => {
                self.log(Level::Debug, format_args!("read {packet_id}: {message}"));
                return Err(ClientError::NotFound(message));
            }
            other => {
                return Err(ClientError::UnexpectedReply {
                    expected: "PACKET",
                    actual: other.name(),
                });
            }
        };

        if let Some(stream_id) = stream_id
            && packet.stream_id != stream_id
        {
            return Err(ClientError::NotFound(format!(
                "packet {packet_id} belongs to {}, not {stream_id}",
                packet.stream_id
            )));
        }

        self.cursor = packet.cursor();
        Ok(packet)
    }

    /// Submits a packet.
    ///
    /// Fails locally, without network I/O, if the server did not grant write
    /// permission or the payload exceeds the negotiated maximum packet
    /// size. With `ack` the server confirms the write and the ID it assigned
    /// is returned; without it nothing is awaited and `None` is returned.
    pub fn write(&mut self, packet: &WritePacket, ack: bool) -> ClientResult<Option<PacketId>> {
        self.require_query_mode("write")?;

        if !self.info.write_permission {
            self.log(
                Level::Error,
                format_args!("write to {} refused: no write permission", packet.stream_id),
            );
            return Err(ClientError::PermissionDenied);
        }

        let max = self.info.max_packet_size;
        if max > 0 && packet.size() > max {
            return Err(ClientError::TooLarge {
                size: packet.size(),
                max,
            });
        }

        let command = Command::Write {
            packet: packet.clone(),
            ack,
        };
        if !ack {
            return match self.send(&command)? {
                Io::Ready(()) => Ok(None),
                Io::TimedOut => Err(ClientError::Timeout),
            };
        }

        match self.request(&command)? {
            Reply::Ok { value, .. } => Ok(Some(PacketId::new(value))),
            Reply::Error { message, .. } => {
                self.log(
                    Level::Error,
                    format_args!("write to {} failed: {message}", packet.stream_id),
                );
                Err(ClientError::Server(message))
            }
            other => Err(ClientError::UnexpectedReply {
                expected: "OK",
                actual: other.name(),
            }),
        }
    }

    /// Requests server information and returns the XML document verbatim.
    pub fn get_info(&mut self, kind: InfoKind) -> ClientResult<String> {
        self.info_request(kind, None)
    }

    /// Like [`Session::get_info`], narrowed by a server-side pattern (for
    /// example the stream IDs listed by [`InfoKind::Streams`]).
    pub fn get_info_matching(&mut self, kind: InfoKind, pattern: &str) -> ClientResult<String> {
        self.info_request(kind, Some(pattern))
    }

    fn info_request(&mut self, kind: InfoKind, pattern: Option<&str>) -> ClientResult<String> {
        self.require_query_mode("info")?;

        let reply = self.request(&Command::Info {
            kind,
            pattern: pattern.map(str::to_string),
        })?;

        match reply {
            Reply::Info { kind: got, xml } if got == kind => Ok(xml),
            Reply::Info { kind: got, .. } => {
                self.log(
                    Level::Warn,
                    format_args!("requested INFO {kind}, server answered INFO {got}"),
                );
                Err(ClientError::UnexpectedReply {
                    expected: "INFO",
                    actual: "INFO (other kind)",
                })
            }
            Reply::Error { message, .. } => Err(ClientError::Server(message)),
            other => Err(ClientError::UnexpectedReply {
                expected: "INFO",
                actual: other.name(),
            }),
        }
    }
}
