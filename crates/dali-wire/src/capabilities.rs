//! Server capability flags carried in the `ID` reply.
//!
//! ```text
//! ID DataLink 2020.075 :: DLPROTO:1.0 PACKETSIZE:512 WRITE
//!                         └────────── capabilities ──────┘
//! ```

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// `DataLink` protocol version as reported by the server.
///
/// The default, `0.0`, means the server did not report one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// True when the server never reported a version.
    pub fn is_unknown(&self) -> bool {
        *self == Self::default()
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid protocol version {s:?}");
        let (major, minor) = s.split_once('.').unwrap_or((s, "0"));

        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Capabilities announced by the server.
///
/// Every field is optional on the wire; unrecognised tokens are kept in
/// `other` so they can still be logged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// `DLPROTO:<major.minor>`
    pub protocol_version: Option<ProtocolVersion>,
    /// `PACKETSIZE:<bytes>`
    pub packet_size: Option<u32>,
    /// `WRITE`: the client may submit packets.
    pub write: bool,
    /// Anything else.
    pub other: Vec<String>,
}

impl Capabilities {
    /// Parses a space-separated capability list. Tokens that fail to parse
    /// end up in `other` rather than failing the handshake.
    pub fn parse(text: &str) -> Self {
        let mut capabilities = Self::default();

        for token in text.split_ascii_whitespace() {
            if let Some(version) = token.strip_prefix("DLPROTO:") {
                if let Ok(version) = version.parse() {
                    capabilities.protocol_version = Some(version);
                    continue;
                }
            } else if let Some(size) = token.strip_prefix("PACKETSIZE:") {
                if let Ok(size) = size.parse() {
                    capabilities.packet_size = Some(size);
                    continue;
                }
            } else if token == "WRITE" {
                capabilities.write = true;
                continue;
            }
            capabilities.other.push(token.to_string());
        }

        capabilities
    }
}

impl Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens = Vec::new();
        if let Some(version) = self.protocol_version {
            tokens.push(format!("DLPROTO:{version}"));
        }
        if let Some(size) = self.packet_size {
            tokens.push(format!("PACKETSIZE:{size}"));
        }
        if self.write {
            tokens.push("WRITE".to_string());
        }
        tokens.extend(self.other.iter().cloned());

        f.write_str(&tokens.join(" "))
    }
}
