//! # wiregate-proto
//!
//! Payload model and wire codec for the wiregate real-time gateway protocol.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod event;
pub mod intents;
pub mod model;
pub mod opcode;
pub mod payload;

pub use codec::{JsonCodec, PayloadCodec, MAX_PAYLOAD_SIZE};
pub use error::ProtoError;
pub use event::{EventKind, GatewayEvent};
pub use intents::Intents;
pub use model::{Guild, Message, MessageDelete, Snowflake, TypingStart, UnavailableGuild, User};
pub use opcode::{CloseCode, GatewayCloseCode, OpCode};
pub use payload::{
    Activity, ConnectionProperties, Hello, Identify, Payload, Ready, RequestGuildMembers, Resume,
    Status, UpdatePresence, UpdateVoiceState,
};
