//! # dali-client: synchronous `DataLink` client
//!
//! This crate talks to a `DataLink` packet server (for example `ringserver`)
//! using the framed ASCII protocol defined in `dali-wire`. One [`Session`]
//! owns one TCP connection and tracks:
//!
//! - what the server announced during the handshake ([`SessionInfo`]),
//! - the read [`Cursor`] (last packet received), persistable with
//!   [`save_state`] / [`load_state`],
//! - the stream mode: query mode for request/response calls, streaming
//!   mode while [`Session::collect`] is in use.
//!
//! ## Usage
//!
//! ```no_run
//! use dali_client::{Collected, Config, InfoKind, Session, TerminateHandle};
//!
//! let mut session = Session::open(Config::new("localhost:16000"))?;
//! println!("{}", session.get_info(InfoKind::Status)?);
//!
//! session.set_match("IU_.*/MSEED")?;
//! if session.recover_state("collector.state").is_err() {
//!     session.position_latest()?;
//! }
//!
//! let stop: TerminateHandle = session.terminate_handle();
//! // hand `stop` to a signal handler ...
//!
//! while let Collected::Packet(packet) = session.collect()? {
//!     println!("{} #{} {} bytes", packet.stream_id, packet.id, packet.size());
//!     session.save_state("collector.state")?;
//! }
//! # Ok::<(), dali_client::ClientError>(())
//! ```
//!
//! ## Configuration
//!
//! ```
//! use dali_client::Config;
//! use std::time::Duration;
//!
//! let config = Config::new("ringserver.example.org")
//!     .with_client_id("slarchive:ops:4242:x86_64")
//!     .with_keepalive(Duration::from_secs(30))
//!     .with_io_timeout(Duration::from_secs(10));
//! assert_eq!(config.socket_address(), "ringserver.example.org:16000");
//! ```

mod channel;
mod collector;
mod config;
mod error;
mod negotiate;
mod packet_io;
mod selector;
mod session;
mod sink;
mod state;

#[cfg(test)]
mod test_server;

pub use channel::{Channel, Io, Wait};
pub use collector::Collected;
pub use config::{Config, generate_client_id};
pub use error::{ClientError, ClientResult, ConnectFailure};
pub use negotiate::{SessionInfo, negotiate};
pub use session::{Session, StreamMode, TerminateHandle};
pub use sink::{Level, LogSink, StdioSink, TracingSink};
pub use state::{StateError, StateResult, load_state, save_state};

// Re-export the types that appear in this crate's API
pub use dali_types::{Cursor, InfoKind, Packet, PacketId, PacketTime, WritePacket};
pub use dali_wire::{DEFAULT_PORT, ProtocolVersion};
