//! Dispatched gateway events.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProtoError;
use crate::model::{Guild, Message, MessageDelete, TypingStart, UnavailableGuild};

/// Tag identifying the type of a dispatched event.
///
/// Responders declare the kinds they handle; the dispatcher matches on this
/// tag instead of inspecting event contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `MESSAGE_CREATE`
    MessageCreate,
    /// `MESSAGE_UPDATE`
    MessageUpdate,
    /// `MESSAGE_DELETE`
    MessageDelete,
    /// `GUILD_CREATE`
    GuildCreate,
    /// `GUILD_UPDATE`
    GuildUpdate,
    /// `GUILD_DELETE`
    GuildDelete,
    /// `TYPING_START`
    TypingStart,
    /// Any event name this crate does not model.
    Unknown,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::MessageCreate,
        Self::MessageUpdate,
        Self::MessageDelete,
        Self::GuildCreate,
        Self::GuildUpdate,
        Self::GuildDelete,
        Self::TypingStart,
        Self::Unknown,
    ];

    /// Wire name of the event, or `None` for [`EventKind::Unknown`].
    #[must_use]
    pub const fn wire_name(self) -> Option<&'static str> {
        Some(match self {
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::TypingStart => "TYPING_START",
            Self::Unknown => return None,
        })
    }

    /// Look up the kind for a wire name.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == Some(name))
            .unwrap_or(Self::Unknown)
    }
}

/// An event delivered through a dispatch payload.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A message was created.
    MessageCreate(Message),
    /// A message was edited.
    MessageUpdate(Message),
    /// A message was deleted.
    MessageDelete(MessageDelete),
    /// A guild became available or the user joined one.
    GuildCreate(Guild),
    /// A guild was updated.
    GuildUpdate(Guild),
    /// A guild became unavailable or the user left it.
    GuildDelete(UnavailableGuild),
    /// A user started typing.
    TypingStart(TypingStart),
    /// An event this crate does not model, kept as raw JSON.
    Unknown {
        /// Wire name of the event.
        name: String,
        /// Raw event data.
        data: Value,
    },
}

impl GatewayEvent {
    /// The tag used to route this event to responders.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::MessageCreate(_) => EventKind::MessageCreate,
            Self::MessageUpdate(_) => EventKind::MessageUpdate,
            Self::MessageDelete(_) => EventKind::MessageDelete,
            Self::GuildCreate(_) => EventKind::GuildCreate,
            Self::GuildUpdate(_) => EventKind::GuildUpdate,
            Self::GuildDelete(_) => EventKind::GuildDelete,
            Self::TypingStart(_) => EventKind::TypingStart,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Unknown { name, .. } => name,
            other => other.kind().wire_name().unwrap_or_default(),
        }
    }

    /// Build an event from its wire name and data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data does not match the shape of a modelled
    /// event.
    pub fn from_parts(name: &str, data: Value) -> Result<Self, ProtoError> {
        Ok(match EventKind::from_wire_name(name) {
            EventKind::MessageCreate => Self::MessageCreate(parse(name, data)?),
            EventKind::MessageUpdate => Self::MessageUpdate(parse(name, data)?),
            EventKind::MessageDelete => Self::MessageDelete(parse(name, data)?),
            EventKind::GuildCreate => Self::GuildCreate(parse(name, data)?),
            EventKind::GuildUpdate => Self::GuildUpdate(parse(name, data)?),
            EventKind::GuildDelete => Self::GuildDelete(parse(name, data)?),
            EventKind::TypingStart => Self::TypingStart(parse(name, data)?),
            EventKind::Unknown => Self::Unknown {
                name: name.to_string(),
                data,
            },
        })
    }

    /// Serialize the event data back to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<Value, ProtoError> {
        match self {
            Self::MessageCreate(m) | Self::MessageUpdate(m) => to_value(m),
            Self::MessageDelete(d) => to_value(d),
            Self::GuildCreate(g) | Self::GuildUpdate(g) => to_value(g),
            Self::GuildDelete(g) => to_value(g),
            Self::TypingStart(t) => to_value(t),
            Self::Unknown { data, .. } => Ok(data.clone()),
        }
    }
}

fn parse<T: DeserializeOwned>(name: &str, data: Value) -> Result<T, ProtoError> {
    serde_json::from_value(data)
        .map_err(|e| ProtoError::Decoding(format!("invalid {name} event: {e}")))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ProtoError> {
    serde_json::to_value(value).map_err(|e| ProtoError::Encoding(e.to_string()))
}
