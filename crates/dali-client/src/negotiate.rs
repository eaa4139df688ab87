//! Handshake and capability discovery.

use dali_wire::{Capabilities, Command, ProtocolVersion, Reply};
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, Io, Wait};
use crate::error::{ClientError, ClientResult};

/// What the server told us about itself during the handshake.
///
/// Fields the server did not report keep their defaults: protocol version
/// `0.0`, maximum packet size 0 (unknown) and no write permission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Server software identification, e.g. `DataLink 2020.075`.
    pub server_id: String,
    pub protocol_version: ProtocolVersion,
    /// Largest packet payload the server accepts, 0 if unreported.
    pub max_packet_size: usize,
    pub write_permission: bool,
}

impl SessionInfo {
    fn from_capabilities(server_id: String, capabilities: &Capabilities) -> Self {
        Self {
            server_id,
            protocol_version: capabilities.protocol_version.unwrap_or_default(),
            max_packet_size: capabilities.packet_size.map_or(0, |size| size as usize),
            write_permission: capabilities.write,
        }
    }
}

/// Identifies the client and records the server's capabilities.
///
/// Must be the first exchange on a fresh channel.
pub fn negotiate(channel: &mut Channel, client_id: &str) -> ClientResult<SessionInfo> {
    let command = Command::Identify {
        client_id: client_id.to_string(),
    };
    if let Io::TimedOut = channel.send(&command)? {
        return Err(ClientError::Timeout);
    }

    let reply = match channel.receive(Wait::Timeout)? {
        Io::Ready(reply) => reply,
        Io::TimedOut => return Err(ClientError::Timeout),
    };

    match reply {
        Reply::Id {
            server,
            capabilities,
        } => Ok(SessionInfo::from_capabilities(server, &capabilities)),
        Reply::Error { message, .. } => Err(ClientError::Rejected(message)),
        other => Err(ClientError::ProtocolMismatch(format!(
            "expected ID reply to handshake, got {}",
            other.name()
        ))),
    }
}
