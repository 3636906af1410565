//! Minimal object model carried inside gateway events.
//!
//! Only the fields the gateway client itself or its tests look at are
//! modelled; everything else is ignored during deserialization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtoError;

/// A 64-bit object identifier, transported as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snowflake(u64);

impl Snowflake {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for Snowflake {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| ProtoError::InvalidValue(format!("invalid snowflake '{s}': {e}")))
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Self(n)),
        }
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: Snowflake,
    /// Username.
    pub username: String,
    /// Whether the account belongs to a bot.
    #[serde(default)]
    pub bot: bool,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID.
    pub id: Snowflake,
    /// Channel the message was sent in.
    pub channel_id: Snowflake,
    /// Guild the message was sent in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    /// Author; absent on some partial updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    /// Text content.
    #[serde(default)]
    pub content: String,
}

/// Identifies a deleted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelete {
    /// Message ID.
    pub id: Snowflake,
    /// Channel the message was in.
    pub channel_id: Snowflake,
    /// Guild the message was in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
}

/// A guild (server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    /// Guild ID.
    pub id: Snowflake,
    /// Guild name.
    pub name: String,
    /// Owner of the guild.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Snowflake>,
    /// Approximate member count, when sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u64>,
}

/// A guild that is unavailable or that the user left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    /// Guild ID.
    pub id: Snowflake,
    /// Set when the guild is unavailable due to an outage.
    #[serde(default)]
    pub unavailable: bool,
}

/// A user started typing in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingStart {
    /// Channel ID.
    pub channel_id: Snowflake,
    /// Guild ID, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    /// User who started typing.
    pub user_id: Snowflake,
    /// Unix time in seconds.
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_serializes_as_string() {
        let json = serde_json::to_string(&Snowflake::new(80_351_110_224_678_912))
            .expect("serialize");
        assert_eq!(json, "\"80351110224678912\"");
    }

    #[test]
    fn test_snowflake_accepts_string_and_number() {
        let from_str: Snowflake = serde_json::from_str("\"42\"").expect("string form");
        let from_num: Snowflake = serde_json::from_str("42").expect("number form");
        assert_eq!(from_str, from_num);
        assert_eq!(from_str.get(), 42);
    }

    #[test]
    fn test_snowflake_rejects_garbage() {
        assert!(serde_json::from_str::<Snowflake>("\"abc\"").is_err());
        assert!("abc".parse::<Snowflake>().is_err());
    }

    #[test]
    fn test_message_ignores_unknown_fields() {
        let json = r#"{
            "id": "1",
            "channel_id": "2",
            "content": "hello",
            "tts": false,
            "author": {"id": "3", "username": "ferris", "avatar": null}
        }"#;
        let message: Message = serde_json::from_str(json).expect("message");
        assert_eq!(message.content, "hello");
        assert_eq!(message.author.map(|a| a.username), Some("ferris".to_string()));
        assert!(message.guild_id.is_none());
    }
}
