//! Session configuration.

use std::time::Duration;

use dali_wire::{DEFAULT_PORT, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};

/// Host used when the address omits one.
pub const DEFAULT_HOST: &str = "localhost";

/// Configuration for a [`Session`](crate::Session).
///
/// Fixed for the lifetime of the session; everything the library learns or
/// updates while connected lives in the session itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Server address, `host:port`. Either part may be omitted.
    pub address: String,
    /// Identification sent to the server, conventionally
    /// `program:user:pid:platform`.
    pub client_id: String,
    /// Idle time after which a keepalive is sent while streaming.
    /// `Duration::ZERO` disables keepalives.
    pub keepalive: Duration,
    /// Bound on every send and receive. `Duration::ZERO` waits forever.
    pub io_timeout: Duration,
    /// Largest payload accepted from the server in a single frame.
    pub max_frame_payload: usize,
}

impl Config {
    /// Creates a configuration for the given server address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Sets the server address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets the client identification string.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Sets the keepalive interval (`Duration::ZERO` disables).
    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Sets the I/O timeout (`Duration::ZERO` disables).
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the largest frame payload accepted from the server.
    pub fn with_max_frame_payload(mut self, size: usize) -> Self {
        self.max_frame_payload = size;
        self
    }

    /// The address with default host and port filled in.
    pub fn socket_address(&self) -> String {
        let address = self.address.trim();

        // A bracketed IPv6 literal may carry a port after the bracket.
        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            match rest.split_once(']') {
                Some((host, tail)) => (
                    format!("[{host}]"),
                    tail.strip_prefix(':').unwrap_or_default(),
                ),
                None => (address.to_string(), ""),
            }
        } else {
            match address.rsplit_once(':') {
                Some((host, port)) => (host.to_string(), port),
                None => (address.to_string(), ""),
            }
        };

        let host = if host.is_empty() { DEFAULT_HOST } else { host.as_str() };
        if port.is_empty() {
            format!("{host}:{DEFAULT_PORT}")
        } else {
            format!("{host}:{port}")
        }
    }

    /// The I/O timeout as a socket timeout, `None` meaning no bound.
    pub fn io_timeout(&self) -> Option<Duration> {
        (!self.io_timeout.is_zero()).then_some(self.io_timeout)
    }

    /// The keepalive interval, `None` when disabled.
    pub fn keepalive(&self) -> Option<Duration> {
        (!self.keepalive.is_zero()).then_some(self.keepalive)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: format!("{DEFAULT_HOST}:{DEFAULT_PORT}"),
            client_id: generate_client_id(env!("CARGO_PKG_NAME")),
            keepalive: Duration::from_secs(600),
            io_timeout: Duration::from_secs(60),
            max_frame_payload: MAX_PAYLOAD_SIZE,
        }
    }
}

/// Builds the conventional `program:user:pid:platform` client ID.
pub fn generate_client_id(program: &str) -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    // Header fields cannot contain whitespace.
    let clean = |s: &str| s.replace(|c: char| c.is_whitespace() || c == ':', "_");

    format!(
        "{}:{}:{}:{}",
        clean(program),
        clean(&user),
        std::process::id(),
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_address_defaults() {
        let cases = [
            ("", "localhost:16000"),
            ("server.example.org", "server.example.org:16000"),
            ("server.example.org:", "server.example.org:16000"),
            (":18000", "localhost:18000"),
            ("10.0.0.1:16001", "10.0.0.1:16001"),
            ("[::1]", "[::1]:16000"),
            ("[::1]:17000", "[::1]:17000"),
        ];

        for (address, expected) in cases {
            assert_eq!(Config::new(address).socket_address(), expected, "{address:?}");
        }
    }

    #[test]
    fn test_zero_disables_timers() {
        let config = Config::default()
            .with_io_timeout(Duration::ZERO)
            .with_keepalive(Duration::ZERO);

        assert_eq!(config.io_timeout(), None);
        assert_eq!(config.keepalive(), None);
        assert_eq!(Config::default().io_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_generated_client_id_shape() {
        let id = generate_client_id("my tool");
        let fields: Vec<&str> = id.split(':').collect();

        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], "my_tool");
        assert_eq!(fields[2], std::process::id().to_string());
        assert!(!id.contains(char::is_whitespace));
    }
}
