//! Client error types.

use std::fmt::{self, Display};
use std::io;

use dali_wire::WireError;
use thiserror::Error;

use crate::session::StreamMode;
use crate::state::StateError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Why a connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Address did not resolve or no route to the host.
    Unreachable,
    /// The host answered but nothing listens on the port.
    Refused,
    /// No answer within the I/O timeout.
    Timeout,
}

impl ConnectFailure {
    pub(crate) fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectFailure::Refused,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectFailure::Timeout,
            _ => ConnectFailure::Unreachable,
        }
    }
}

impl Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectFailure::Unreachable => "unreachable",
            ConnectFailure::Refused => "refused",
            ConnectFailure::Timeout => "timed out",
        })
    }
}

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection could not be established.
    #[error("connection to {address} {kind}: {source}")]
    Connect {
        address: String,
        kind: ConnectFailure,
        source: io::Error,
    },

    /// The socket failed mid-session; the session has been disconnected.
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] io::Error),

    /// Connection not established.
    #[error("not connected to server")]
    NotConnected,

    /// No reply within the I/O timeout.
    #[error("timed out waiting for server")]
    Timeout,

    /// The server sent bytes that are not a frame; the session has been
    /// disconnected.
    #[error("corrupt frame from server: {0}")]
    Framing(#[source] WireError),

    /// A frame could not be decoded into a message, or a command could not
    /// be encoded.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// The server did not answer the handshake with an identification.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The server refused the handshake.
    #[error("server rejected the session: {0}")]
    Rejected(String),

    /// A reply arrived that does not answer the command in flight.
    #[error("unexpected reply: expected {expected}, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: &'static str,
    },

    /// The server ended streaming on its own.
    #[error("server ended the stream")]
    StreamClosed,

    /// Write attempted without the server's write permission.
    #[error("write permission not granted by server")]
    PermissionDenied,

    /// Operation not valid in the current stream mode.
    #[error("{operation} is not allowed while {mode}")]
    Mode {
        operation: &'static str,
        mode: StreamMode,
    },

    /// Position or read target does not exist on the server.
    #[error("not found: {0}")]
    NotFound(String),

    /// Packet exceeds the negotiated maximum packet size.
    #[error("packet too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// The server did not accept a match or reject pattern.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// The server returned an error.
    #[error("server error: {0}")]
    Server(String),

    /// State file error.
    #[error(transparent)]
    State(#[from] StateError),
}

impl ClientError {
    /// True for errors after which the session holds no socket and must
    /// reconnect (and renegotiate) before further use.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. }
                | ClientError::ConnectionLost(_)
                | ClientError::NotConnected
                | ClientError::Framing(_)
        )
    }

    /// True for "nothing arrived in time", which callers may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout)
    }
}
