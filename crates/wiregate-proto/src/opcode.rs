//! Opcodes and close codes.

use std::fmt;

use crate::error::ProtoError;

/// Envelope opcode distinguishing gateway payloads on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// An event was dispatched.
    Dispatch = 0,
    /// Keepalive ping, sent by either side.
    Heartbeat = 1,
    /// Starts a new session.
    Identify = 2,
    /// Updates the client's presence.
    PresenceUpdate = 3,
    /// Joins, moves or leaves voice channels.
    VoiceStateUpdate = 4,
    /// Resumes a previous session.
    Resume = 6,
    /// The server asks the client to reconnect and resume.
    Reconnect = 7,
    /// Requests guild member chunks.
    RequestGuildMembers = 8,
    /// The session has been invalidated.
    InvalidSession = 9,
    /// First payload after connecting, carries the heartbeat interval.
    Hello = 10,
    /// Acknowledges a received heartbeat.
    HeartbeatAck = 11,
}

impl OpCode {
    /// Numeric value on the wire.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::Identify),
            3 => Ok(Self::PresenceUpdate),
            4 => Ok(Self::VoiceStateUpdate),
            6 => Ok(Self::Resume),
            7 => Ok(Self::Reconnect),
            8 => Ok(Self::RequestGuildMembers),
            9 => Ok(Self::InvalidSession),
            10 => Ok(Self::Hello),
            11 => Ok(Self::HeartbeatAck),
            other => Err(ProtoError::UnknownOpcode(other)),
        }
    }
}

/// Application close codes the gateway uses when it terminates a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum GatewayCloseCode {
    /// Something went wrong on the server side.
    UnknownError = 4000,
    /// An invalid opcode was sent.
    UnknownOpcode = 4001,
    /// An undecodable payload was sent.
    DecodeError = 4002,
    /// A payload was sent before identifying.
    NotAuthenticated = 4003,
    /// The token was rejected.
    AuthenticationFailed = 4004,
    /// More than one identify was sent.
    AlreadyAuthenticated = 4005,
    /// The resume sequence number was invalid.
    InvalidSequence = 4007,
    /// Payloads were sent too quickly.
    RateLimited = 4008,
    /// The session timed out.
    SessionTimedOut = 4009,
    /// An invalid shard was sent when identifying.
    InvalidShard = 4010,
    /// The session would handle too many guilds.
    ShardingRequired = 4011,
    /// An invalid API version was requested.
    InvalidApiVersion = 4012,
    /// Invalid intents were sent.
    InvalidIntents = 4013,
    /// Intents the client is not allowed to use were sent.
    DisallowedIntents = 4014,
}

impl GatewayCloseCode {
    /// Map a raw close code to a known gateway close code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimedOut,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            _ => return None,
        })
    }

    /// Numeric value on the wire.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// A raw WebSocket close code, which may or may not be a gateway close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: Self = Self(1000);
    /// The endpoint is going away.
    pub const ENDPOINT_UNAVAILABLE: Self = Self(1001);
    /// The server hit an internal error.
    pub const INTERNAL_ERROR: Self = Self(1011);

    /// Interpret this code as a gateway close code, if it is one.
    #[must_use]
    pub const fn gateway(self) -> Option<GatewayCloseCode> {
        GatewayCloseCode::from_code(self.0)
    }
}

impl From<GatewayCloseCode> for CloseCode {
    fn from(code: GatewayCloseCode) -> Self {
        Self(code.code())
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gateway() {
            Some(code) => write!(f, "{} ({code:?})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}
