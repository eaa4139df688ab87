//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur during wire protocol operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame does not start with "DL".
    #[error("invalid frame signature: {0:02x?}")]
    InvalidSignature([u8; 2]),

    /// Header is empty or not ASCII.
    #[error("invalid header: {0:?}")]
    InvalidHeader(String),

    /// Header does not fit the one-byte length field.
    #[error("header too long: {0} bytes (max 255)")]
    HeaderTooLong(usize),

    /// Declared payload exceeds the accepted maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Header keyword is not a known message.
    #[error("unknown message: {0:?}")]
    UnknownMessage(String),

    /// Header is a known message but its fields are wrong.
    #[error("malformed header {header:?}: {reason}")]
    Malformed { header: String, reason: String },

    /// A value cannot be placed in a header field.
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

impl WireError {
    pub(crate) fn malformed(header: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            header: header.to_string(),
            reason: reason.into(),
        }
    }
}
