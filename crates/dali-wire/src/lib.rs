//! # dali-wire: `DataLink` wire protocol
//!
//! This crate defines the message framing and the command/reply messages
//! exchanged between a `DataLink` client and server. It performs no I/O.
//!
//! ## Frame Format
//!
//! ```text
//! ┌─────────┬────────────┬──────────────────┬──────────────────┐
//! │ "DL"    │ Header len │ Header (ASCII)   │     Payload      │
//! │ (2 B)   │ (1 B)      │ (≤ 255 B)        │     (var)        │
//! └─────────┴────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! - **Header**: space-separated fields, keyword first (`PACKET`, `OK`, ...)
//! - **Payload**: present for messages whose header ends with a size field
//!
//! ## Message Types
//!
//! [`Command`]s flow client → server, [`Reply`]s flow server → client.
//! Because a few keywords exist in both directions with different layouts,
//! decoding a frame needs its [`Direction`].

mod capabilities;
mod error;
mod frame;
mod message;

pub use capabilities::{Capabilities, ProtocolVersion};
pub use error::{WireError, WireResult};
pub use frame::{
    Direction, Frame, MAX_HEADER_SIZE, MAX_PAYLOAD_SIZE, PREHEADER_SIZE, SIGNATURE,
};
pub use message::{Command, Position, Reply};

/// Default TCP port of a `DataLink` server.
pub const DEFAULT_PORT: u16 = 16000;

#[cfg(test)]
mod tests;
