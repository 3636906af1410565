//! Error types for the wiregate-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding gateway payloads.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a payload.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a payload.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The envelope carried an opcode this client does not understand.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),

    /// Missing required envelope field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The encoded payload exceeds the gateway's hard size ceiling.
    #[error("payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Encoded size in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        limit: usize,
    },

    /// A string could not be parsed into a protocol value.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
