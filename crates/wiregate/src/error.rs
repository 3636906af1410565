//! Error types for wiregate.

use thiserror::Error;
use wiregate_proto::{CloseCode, GatewayCloseCode, ProtoError};

use crate::endpoint::EndpointError;
use crate::transport::TransportError;

/// Errors that can occur while running a gateway connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The socket failed to connect, send or receive.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The gateway closed the connection with a close frame.
    #[error("gateway closed the connection with code {code}: {reason}")]
    Closed {
        /// Close code sent by the gateway.
        code: CloseCode,
        /// Close reason sent by the gateway.
        reason: String,
    },

    /// An unexpected payload arrived at a handshake point.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtoError),

    /// The previous heartbeat was not acknowledged before the next was due.
    #[error("the gateway did not acknowledge the last heartbeat in time")]
    HeartbeatTimeout,

    /// Resuming replayed more payloads than the configured bound.
    #[error("resume replayed more than {limit} payloads")]
    ResumeOverflow {
        /// Configured replay bound.
        limit: usize,
    },

    /// The gateway endpoint could not be looked up.
    #[error("endpoint lookup failed: {0}")]
    Endpoint(#[from] EndpointError),

    /// The operation was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    /// `run` was called while the client was already running.
    #[error("the gateway client is already running")]
    AlreadyRunning,

    /// An application tried to submit a payload that is not a command.
    #[error("{0} payloads cannot be submitted")]
    NotACommand(String),

    /// Reconnecting failed too many times in a row.
    #[error("gave up reconnecting after {attempts} attempts: {last}")]
    ReconnectExhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// Error of the last attempt.
        last: Box<GatewayError>,
    },

    /// A background task panicked or was aborted.
    #[error("{task} task failed: {reason}")]
    TaskFailed {
        /// Which task failed.
        task: &'static str,
        /// Join error description.
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// The close code associated with this error, if any.
    ///
    /// A heartbeat timeout reports [`GatewayCloseCode::SessionTimedOut`].
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Closed { code, .. } => Some(*code),
            Self::HeartbeatTimeout => Some(GatewayCloseCode::SessionTimedOut.into()),
            Self::ReconnectExhausted { last, .. } => last.close_code(),
            _ => None,
        }
    }
}
