//! Client configuration.
//!
//! Configuration for a gateway client, including:
//! - Credentials and declared intents
//! - REST/API settings used for endpoint lookup
//! - Heartbeat timing
//! - Reconnection backoff
//! - Session resume limits

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wiregate_proto::{ConnectionProperties, Intents};

use crate::error::GatewayError;
use crate::gateway::{HeartbeatConfig, ReconnectConfig, SessionConfig};

/// Default gateway protocol version.
pub const DEFAULT_API_VERSION: u8 = 10;

/// Default REST API base used for endpoint lookup.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Serde helpers storing a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Main client configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Bot token used to identify and resume.
    #[serde(default)]
    pub token: String,
    /// Intents declared when identifying.
    #[serde(default = "default_intents")]
    pub intents: Intents,
    /// Gateway protocol version appended to the socket URL.
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    /// REST API base for endpoint lookup.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// How long to wait for running responders during teardown.
    #[serde(
        rename = "responder_drain_timeout_ms",
        default = "default_drain_timeout",
        with = "duration_ms"
    )]
    pub responder_drain_timeout: Duration,
    /// Client metadata sent when identifying.
    #[serde(default)]
    pub properties: ConnectionProperties,
    /// Heartbeat timing.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Reconnection backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Session handshake limits.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_intents() -> Intents {
    Intents::DIRECT_MESSAGES
}

const fn default_api_version() -> u8 {
    DEFAULT_API_VERSION
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

const fn default_drain_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            intents: default_intents(),
            api_version: default_api_version(),
            api_base: default_api_base(),
            responder_drain_timeout: default_drain_timeout(),
            properties: ConnectionProperties::default(),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("api_version", &self.api_version)
            .field("api_base", &self.api_base)
            .field("responder_drain_timeout", &self.responder_drain_timeout)
            .field("properties", &self.properties)
            .field("heartbeat", &self.heartbeat)
            .field("reconnect", &self.reconnect)
            .field("session", &self.session)
            .finish()
    }
}

impl GatewayConfig {
    /// Configuration with default settings for the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file without validating it, so callers can fill in
    /// missing values first.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, GatewayError> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string without validating it.
    pub fn parse(content: &str) -> Result<Self, GatewayError> {
        toml::from_str(content).map_err(|e| GatewayError::Config(format!("invalid TOML: {e}")))
    }

    /// Render this configuration as TOML.
    pub fn to_toml(&self) -> Result<String, GatewayError> {
        toml::to_string_pretty(self)
            .map_err(|e| GatewayError::Config(format!("failed to serialize config: {e}")))
    }

    /// Set the token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the declared intents.
    #[must_use]
    pub const fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    /// Set the REST API base.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set the heartbeat timing.
    #[must_use]
    pub const fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the reconnection backoff.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the session handshake limits.
    #[must_use]
    pub const fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Set the responder drain timeout.
    #[must_use]
    pub const fn with_responder_drain_timeout(mut self, timeout: Duration) -> Self {
        self.responder_drain_timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.token.trim().is_empty() {
            return Err(GatewayError::Config("token cannot be empty".to_string()));
        }

        if self.api_version == 0 {
            return Err(GatewayError::Config(
                "api_version must be greater than 0".to_string(),
            ));
        }

        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(GatewayError::Config(
                "api_base must start with http:// or https://".to_string(),
            ));
        }

        if self.heartbeat.max_idle_wait.is_zero() {
            return Err(GatewayError::Config(
                "heartbeat.max_idle_wait_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.backoff_multiplier < 1.0 {
            return Err(GatewayError::Config(
                "reconnect.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.reconnect.initial_delay > self.reconnect.max_delay {
            return Err(GatewayError::Config(
                "reconnect.initial_delay_ms cannot exceed reconnect.max_delay_ms".to_string(),
            ));
        }

        if self.reconnect.max_attempts == Some(0) {
            return Err(GatewayError::Config(
                "reconnect.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.session.invalid_session_min_delay > self.session.invalid_session_max_delay {
            return Err(GatewayError::Config(
                "session.invalid_session_min_delay_ms cannot exceed session.invalid_session_max_delay_ms"
                    .to_string(),
            ));
        }

        if self.session.max_resume_replay == 0 {
            return Err(GatewayError::Config(
                "session.max_resume_replay must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
