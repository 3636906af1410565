//! Gateway payload definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::GatewayEvent;
use crate::intents::Intents;
use crate::model::{Snowflake, UnavailableGuild, User};
use crate::opcode::OpCode;

/// Sent by the server immediately after the socket opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

impl Hello {
    /// Heartbeat interval as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }
}

/// Client metadata sent when identifying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// Operating system.
    pub os: String,
    /// Library name.
    pub browser: String,
    /// Library name.
    pub device: String,
}

impl ConnectionProperties {
    /// Properties describing this process, reporting `library` as the client.
    #[must_use]
    pub fn for_library(library: impl Into<String>) -> Self {
        let library = library.into();
        Self {
            os: std::env::consts::OS.to_string(),
            browser: library.clone(),
            device: library,
        }
    }
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self::for_library("wiregate")
    }
}

/// Starts a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify {
    /// Authentication token.
    pub token: String,
    /// Client metadata.
    pub properties: ConnectionProperties,
    /// Declared intents.
    pub intents: Intents,
    /// Whether payload compression is requested.
    #[serde(default)]
    pub compress: bool,
}

/// Reattaches to an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    /// Authentication token.
    pub token: String,
    /// Session being resumed.
    pub session_id: String,
    /// Last sequence number received.
    pub seq: u64,
}

/// Data of the `READY` dispatch that completes an identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    /// Gateway protocol version.
    #[serde(rename = "v")]
    pub version: u8,
    /// The connected user.
    pub user: User,
    /// Session identifier used for resuming.
    pub session_id: String,
    /// Guilds the user is in, initially unavailable.
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
}

/// Presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Online.
    Online,
    /// Do not disturb.
    Dnd,
    /// Away.
    Idle,
    /// Shown as offline.
    Invisible,
    /// Offline.
    Offline,
}

/// An activity shown in a presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity name.
    pub name: String,
    /// Activity type.
    #[serde(rename = "type")]
    pub kind: u8,
}

/// Updates the client's presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePresence {
    /// Unix time in milliseconds since the client went idle.
    pub since: Option<u64>,
    /// Activities.
    pub activities: Vec<Activity>,
    /// New status.
    pub status: Status,
    /// Whether the client is AFK.
    pub afk: bool,
}

/// Joins, moves between or leaves voice channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateVoiceState {
    /// Guild ID.
    pub guild_id: Snowflake,
    /// Channel to join, `None` to disconnect.
    pub channel_id: Option<Snowflake>,
    /// Whether the client is muted.
    pub self_mute: bool,
    /// Whether the client is deafened.
    pub self_deaf: bool,
}

/// Requests member chunks for a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestGuildMembers {
    /// Guild ID.
    pub guild_id: Snowflake,
    /// Username prefix to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Maximum number of members to send, 0 for all.
    pub limit: u32,
    /// Whether presences should be included.
    #[serde(default)]
    pub presences: bool,
    /// Specific users to fetch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_ids: Vec<Snowflake>,
    /// Nonce echoed back in the chunk events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// A unit exchanged over the gateway, distinguished by its opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Heartbeat interval announcement.
    Hello(Hello),
    /// New session request.
    Identify(Identify),
    /// Session resume request.
    Resume(Resume),
    /// Keepalive carrying the last received sequence number. When sent by
    /// the server it asks the client to heartbeat immediately.
    Heartbeat {
        /// Last received sequence number, if any.
        last_sequence: Option<u64>,
    },
    /// Keepalive acknowledgement.
    HeartbeatAck,
    /// A dispatched event.
    Dispatch {
        /// Sequence number of this event.
        sequence: u64,
        /// The event.
        event: GatewayEvent,
    },
    /// The server asks the client to reconnect and resume.
    Reconnect,
    /// The session is invalid.
    InvalidSession {
        /// Whether the session may be resumed.
        resumable: bool,
    },
    /// Identify succeeded.
    Ready {
        /// Sequence number of the dispatch.
        sequence: u64,
        /// Session data.
        ready: Ready,
    },
    /// Resume succeeded and the replay is complete.
    Resumed {
        /// Sequence number of the dispatch.
        sequence: u64,
    },
    /// Presence update command.
    UpdatePresence(UpdatePresence),
    /// Voice state update command.
    UpdateVoiceState(UpdateVoiceState),
    /// Guild member request command.
    RequestGuildMembers(RequestGuildMembers),
}

impl Payload {
    /// Opcode this payload is sent with.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Hello(_) => OpCode::Hello,
            Self::Identify(_) => OpCode::Identify,
            Self::Resume(_) => OpCode::Resume,
            Self::Heartbeat { .. } => OpCode::Heartbeat,
            Self::HeartbeatAck => OpCode::HeartbeatAck,
            Self::Dispatch { .. } | Self::Ready { .. } | Self::Resumed { .. } => OpCode::Dispatch,
            Self::Reconnect => OpCode::Reconnect,
            Self::InvalidSession { .. } => OpCode::InvalidSession,
            Self::UpdatePresence(_) => OpCode::PresenceUpdate,
            Self::UpdateVoiceState(_) => OpCode::VoiceStateUpdate,
            Self::RequestGuildMembers(_) => OpCode::RequestGuildMembers,
        }
    }

    /// Sequence number, for sequence-bearing payloads.
    #[must_use]
    pub const fn sequence(&self) -> Option<u64> {
        match self {
            Self::Dispatch { sequence, .. }
            | Self::Ready { sequence, .. }
            | Self::Resumed { sequence } => Some(*sequence),
            _ => None,
        }
    }

    /// Whether an application may submit this payload for sending.
    ///
    /// Handshake payloads are owned by the connection engine and
    /// server-originated payloads make no sense outbound.
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat { .. }
                | Self::UpdatePresence(_)
                | Self::UpdateVoiceState(_)
                | Self::RequestGuildMembers(_)
        )
    }

    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Identify(_) => "IDENTIFY",
            Self::Resume(_) => "RESUME",
            Self::Heartbeat { .. } => "HEARTBEAT",
            Self::HeartbeatAck => "HEARTBEAT_ACK",
            Self::Dispatch { event, .. } => event.name(),
            Self::Reconnect => "RECONNECT",
            Self::InvalidSession { .. } => "INVALID_SESSION",
            Self::Ready { .. } => "READY",
            Self::Resumed { .. } => "RESUMED",
            Self::UpdatePresence(_) => "PRESENCE_UPDATE",
            Self::UpdateVoiceState(_) => "VOICE_STATE_UPDATE",
            Self::RequestGuildMembers(_) => "REQUEST_GUILD_MEMBERS",
        }
    }
}
