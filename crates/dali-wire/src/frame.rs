//! Frame encoding and decoding for the wire protocol.
//!
//! A frame consists of a three byte pre-header, an ASCII header and an
//! optional binary payload whose length is declared inside the header.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};

/// Pre-header signature: "DL".
pub const SIGNATURE: [u8; 2] = *b"DL";

/// Pre-header size in bytes (signature + header length).
pub const PREHEADER_SIZE: usize = 3;

/// Maximum header length; the length is carried in a single byte.
pub const MAX_HEADER_SIZE: usize = u8::MAX as usize;

/// Default maximum payload size accepted when decoding (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Which side of the connection produced a frame.
///
/// The two directions use the same keyword for different messages (a
/// client `INFO` request has no payload, a server `INFO` reply does), so the
/// payload length can only be found once the direction is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client command.
    ToServer,
    /// Server reply.
    ToClient,
}

impl Direction {
    /// Returns the payload length a header declares, or 0 if the message
    /// kind carries no payload.
    pub fn declared_payload_len(self, header: &str) -> WireResult<usize> {
        let mut fields = header.split_ascii_whitespace();
        let keyword = fields.next().unwrap_or_default();

        let has_payload = match self {
            Direction::ToServer => matches!(keyword, "MATCH" | "REJECT" | "WRITE"),
            Direction::ToClient => matches!(keyword, "PACKET" | "OK" | "ERROR" | "INFO"),
        };
        if !has_payload {
            return Ok(0);
        }

        let size = fields.last().ok_or_else(|| WireError::malformed(header, "missing size"))?;
        size.parse::<usize>()
            .map_err(|_| WireError::malformed(header, format!("invalid size {size:?}")))
    }
}

/// A complete frame with header and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header text, without the pre-header.
    pub header: String,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a frame, checking that the header can be encoded.
    pub fn new(header: impl Into<String>, payload: Bytes) -> WireResult<Self> {
        let header = header.into();

        if header.len() > MAX_HEADER_SIZE {
            return Err(WireError::HeaderTooLong(header.len()));
        }
        if header.is_empty() || !header.is_ascii() {
            return Err(WireError::InvalidHeader(header));
        }

        Ok(Self { header, payload })
    }

    /// Creates a frame without a payload.
    pub fn header_only(header: impl Into<String>) -> WireResult<Self> {
        Self::new(header, Bytes::new())
    }

    /// First whitespace-separated word of the header.
    pub fn keyword(&self) -> &str {
        self.header.split_ascii_whitespace().next().unwrap_or_default()
    }

    /// Encodes the frame to a byte buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        debug_assert!(self.header.len() <= MAX_HEADER_SIZE);

        buf.reserve(self.total_size());
        buf.put_slice(&SIGNATURE);
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u8(self.header.len() as u8);
        buf.put_slice(self.header.as_bytes());
        buf.put_slice(&self.payload);
    }

    /// Encodes the frame to a new byte buffer.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.total_size());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Attempts to decode a frame from a byte buffer.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded.
    /// Returns `Ok(None)` if more bytes are needed; nothing is consumed.
    /// Returns `Err` if the frame is invalid.
    ///
    /// On success, the consumed bytes are removed from the buffer.
    pub fn decode(
        buf: &mut BytesMut,
        direction: Direction,
        max_payload: usize,
    ) -> WireResult<Option<Self>> {
        if buf.len() < PREHEADER_SIZE {
            return Ok(None);
        }

        if buf[..2] != SIGNATURE {
            return Err(WireError::InvalidSignature([buf[0], buf[1]]));
        }

        let header_len = usize::from(buf[2]);
        if header_len == 0 {
            return Err(WireError::InvalidHeader(String::new()));
        }
        if buf.len() < PREHEADER_SIZE + header_len {
            return Ok(None);
        }

        // Peek at the header without consuming
        let header_bytes = &buf[PREHEADER_SIZE..PREHEADER_SIZE + header_len];
        let header = std::str::from_utf8(header_bytes)
            .ok()
            .filter(|h| h.is_ascii())
            .ok_or_else(|| WireError::InvalidHeader(String::from_utf8_lossy(header_bytes).into()))?
            // Some servers NUL-pad the header
            .trim_end_matches('\0')
            .to_string();

        let payload_len = direction.declared_payload_len(&header)?;
        if payload_len > max_payload {
            return Err(WireError::PayloadTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }

        let total_size = PREHEADER_SIZE + header_len + payload_len;
        if buf.len() < total_size {
            return Ok(None);
        }

        buf.advance(PREHEADER_SIZE + header_len);
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Self { header, payload }))
    }

    /// Returns the total size of the frame in bytes.
    pub fn total_size(&self) -> usize {
        PREHEADER_SIZE + self.header.len() + self.payload.len()
    }
}
