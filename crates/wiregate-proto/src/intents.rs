//! Gateway intents: the event groups a session subscribes to.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Bit set of gateway intents declared when identifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(u64);

impl Intents {
    /// Guild lifecycle events.
    pub const GUILDS: Self = Self(1 << 0);
    /// Guild member events.
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    /// Presence updates.
    pub const GUILD_PRESENCES: Self = Self(1 << 8);
    /// Messages in guild channels.
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    /// Typing notifications in guild channels.
    pub const GUILD_MESSAGE_TYPING: Self = Self(1 << 11);
    /// Direct messages.
    pub const DIRECT_MESSAGES: Self = Self(1 << 12);
    /// Typing notifications in direct messages.
    pub const DIRECT_MESSAGE_TYPING: Self = Self(1 << 14);
    /// Message content in message events.
    pub const MESSAGE_CONTENT: Self = Self(1 << 15);

    const NAMED: [(&'static str, Self); 8] = [
        ("guilds", Self::GUILDS),
        ("guild_members", Self::GUILD_MEMBERS),
        ("guild_presences", Self::GUILD_PRESENCES),
        ("guild_messages", Self::GUILD_MESSAGES),
        ("guild_message_typing", Self::GUILD_MESSAGE_TYPING),
        ("direct_messages", Self::DIRECT_MESSAGES),
        ("direct_message_typing", Self::DIRECT_MESSAGE_TYPING),
        ("message_content", Self::MESSAGE_CONTENT),
    ];

    /// No intents.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Parses a comma-separated list of intent names, e.g.
/// `guilds,guild_messages`, or a raw decimal bit set.
impl FromStr for Intents {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(bits) = s.trim().parse::<u64>() {
            return Ok(Self(bits));
        }

        let mut intents = Self::empty();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let (_, intent) = Self::NAMED
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(name))
                .ok_or_else(|| ProtoError::InvalidValue(format!("unknown intent: {name}")))?;
            intents |= *intent;
        }
        Ok(intents)
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(_, intent)| self.contains(*intent))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "{}", names.join(","))
    }
}
