//! Reconnection policy and exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wiregate_proto::{CloseCode, GatewayCloseCode};

use crate::config::duration_ms;
use crate::error::GatewayError;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the second consecutive reconnection attempt.
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Maximum number of consecutive failed attempts (None = infinite).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for the given attempt number.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let delay_millis = (self.initial_delay.as_millis() as f64 * multiplier)
            .min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(delay_millis).min(self.max_delay)
    }

    /// Check if we should attempt reconnection.
    #[must_use]
    pub const fn should_reconnect(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// What to do after a connection attempt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Reconnect and resume the current session.
    Resume,
    /// Forget the session and reconnect with a fresh identify.
    Fresh,
    /// Stop and report the error.
    Fatal,
}

/// Decide how to recover from `error`.
#[must_use]
pub fn classify(error: &GatewayError) -> Recovery {
    if let Some(code) = error.close_code() {
        return classify_close_code(code);
    }

    match error {
        GatewayError::Transport(_) => Recovery::Resume,
        GatewayError::ResumeOverflow { .. } => Recovery::Fresh,
        _ => Recovery::Fatal,
    }
}

/// Decide how to recover from a close frame carrying `code`.
#[must_use]
pub fn classify_close_code(code: CloseCode) -> Recovery {
    match code.gateway() {
        Some(
            GatewayCloseCode::SessionTimedOut
            | GatewayCloseCode::RateLimited
            | GatewayCloseCode::InvalidSequence
            | GatewayCloseCode::UnknownError,
        ) => Recovery::Fresh,
        Some(_) => Recovery::Fatal,
        None if code == CloseCode::INTERNAL_ERROR || code == CloseCode::ENDPOINT_UNAVAILABLE => {
            Recovery::Fresh
        }
        None => Recovery::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointError;
    use crate::transport::TransportError;
    use test_case::test_case;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.max_attempts.is_none());
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = ReconnectConfig::default();

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(32));
        assert_eq!(config.delay_for_attempt(7), Duration::from_secs(60)); // capped
        assert_eq!(config.delay_for_attempt(500), Duration::from_secs(60));
    }

    #[test]
    fn test_should_reconnect() {
        let unlimited = ReconnectConfig::default();
        assert!(unlimited.should_reconnect(1_000_000));

        let limited = ReconnectConfig {
            max_attempts: Some(3),
            ..ReconnectConfig::default()
        };
        assert!(limited.should_reconnect(2));
        assert!(!limited.should_reconnect(3));
    }

    #[test_case(4000, Recovery::Fresh ; "unknown error")]
    #[test_case(4007, Recovery::Fresh ; "invalid sequence")]
    #[test_case(4008, Recovery::Fresh ; "rate limited")]
    #[test_case(4009, Recovery::Fresh ; "session timed out")]
    #[test_case(1001, Recovery::Fresh ; "endpoint unavailable")]
    #[test_case(1011, Recovery::Fresh ; "internal error")]
    #[test_case(4001, Recovery::Fatal ; "unknown opcode")]
    #[test_case(4004, Recovery::Fatal ; "authentication failed")]
    #[test_case(4014, Recovery::Fatal ; "disallowed intents")]
    #[test_case(1000, Recovery::Fatal ; "normal closure")]
    #[test_case(3000, Recovery::Fatal ; "unassigned")]
    fn test_classify_close_code(code: u16, expected: Recovery) {
        let error = GatewayError::Closed {
            code: CloseCode(code),
            reason: String::new(),
        };
        assert_eq!(classify(&error), expected);
    }

    #[test]
    fn test_classify_without_close_code() {
        assert_eq!(
            classify(&TransportError::Closed.into()),
            Recovery::Resume
        );
        assert_eq!(
            classify(&TransportError::Receive("reset".into()).into()),
            Recovery::Resume
        );
        assert_eq!(classify(&GatewayError::HeartbeatTimeout), Recovery::Fresh);
        assert_eq!(
            classify(&GatewayError::ResumeOverflow { limit: 10 }),
            Recovery::Fresh
        );
        assert_eq!(
            classify(&GatewayError::Protocol("expected READY".into())),
            Recovery::Fatal
        );
        assert_eq!(
            classify(&EndpointError::Http("timeout".into()).into()),
            Recovery::Fatal
        );
        assert_eq!(
            classify(&EndpointError::Status(503).into()),
            Recovery::Fatal
        );
        assert_eq!(
            classify(&EndpointError::Status(401).into()),
            Recovery::Fatal
        );
    }
}
