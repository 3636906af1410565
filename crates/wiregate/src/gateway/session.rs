//! Session handshake: identify a new session or resume an existing one.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wiregate_proto::{Identify, Payload, Resume};

use super::receiver::{is_liveness, PayloadReader};
use super::state::SessionState;
use crate::config::{duration_ms, GatewayConfig};
use crate::error::GatewayError;

/// Limits applied while establishing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lower bound of the random wait after an invalidated resume.
    #[serde(rename = "invalid_session_min_delay_ms", with = "duration_ms")]
    pub invalid_session_min_delay: Duration,
    /// Upper bound of the random wait after an invalidated resume.
    #[serde(rename = "invalid_session_max_delay_ms", with = "duration_ms")]
    pub invalid_session_max_delay: Duration,
    /// Most payloads a single resume may replay before it is abandoned.
    pub max_resume_replay: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            invalid_session_min_delay: Duration::from_secs(1),
            invalid_session_max_delay: Duration::from_secs(5),
            max_resume_replay: 10_000,
        }
    }
}

impl SessionConfig {
    /// Pick the wait before identifying after an invalidated resume.
    pub(crate) fn invalid_session_delay(&self) -> Duration {
        let min = self.invalid_session_min_delay.as_millis() as u64;
        let max = (self.invalid_session_max_delay.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// One handshake over a freshly opened connection.
pub(crate) struct Handshake<'a> {
    pub reader: &'a mut PayloadReader,
    /// Feeds the sender's control queue.
    pub control: &'a mpsc::UnboundedSender<Payload>,
    /// Receives payloads replayed while resuming.
    pub inbound: &'a mpsc::UnboundedSender<Payload>,
    pub session: &'a SessionState,
    pub config: &'a GatewayConfig,
    pub cancel: &'a CancellationToken,
}

impl Handshake<'_> {
    /// Resume if a session exists, otherwise identify.
    pub(crate) async fn perform(mut self) -> Result<(), GatewayError> {
        match self.session.session_id() {
            Some(session_id) => self.resume(session_id).await,
            None => self.identify().await,
        }
    }

    async fn identify(&mut self) -> Result<(), GatewayError> {
        debug!(intents = %self.config.intents, "Identifying");
        self.send(Payload::Identify(Identify {
            token: self.config.token.clone(),
            properties: self.config.properties.clone(),
            intents: self.config.intents,
            compress: false,
        }))?;

        match self.next().await? {
            Payload::Ready { ready, .. } => {
                info!(
                    session_id = %ready.session_id,
                    user = %ready.user.username,
                    guilds = ready.guilds.len(),
                    "Session established"
                );
                self.session.begin(ready.session_id);
                Ok(())
            }
            other => Err(GatewayError::Protocol(format!(
                "expected READY after IDENTIFY, got {}",
                other.name()
            ))),
        }
    }

    async fn resume(&mut self, session_id: String) -> Result<(), GatewayError> {
        let seq = self.session.last_sequence().unwrap_or(0);
        debug!(%session_id, seq, "Resuming session");
        self.send(Payload::Resume(Resume {
            token: self.config.token.clone(),
            session_id,
            seq,
        }))?;

        let limit = self.config.session.max_resume_replay;
        let mut replayed = 0usize;
        loop {
            match self.next().await? {
                Payload::Resumed { .. } => {
                    info!(replayed, "Session resumed");
                    return Ok(());
                }
                Payload::InvalidSession { resumable } => {
                    let delay = self.config.session.invalid_session_delay();
                    warn!(
                        resumable,
                        delay_ms = delay.as_millis() as u64,
                        "Session invalidated, identifying again"
                    );

                    self.pause(delay).await?;
                    self.session.clear();
                    return self.identify().await;
                }
                payload => {
                    replayed += 1;
                    if replayed > limit {
                        warn!(limit, "Resume replayed too many payloads");
                        return Err(GatewayError::ResumeOverflow { limit });
                    }
                    if self.inbound.send(payload).is_err() {
                        return Err(GatewayError::Cancelled);
                    }
                }
            }
        }
    }

    fn send(&self, payload: Payload) -> Result<(), GatewayError> {
        self.control
            .send(payload)
            .map_err(|_| GatewayError::TaskFailed {
                task: "sender",
                reason: "control queue closed".to_string(),
            })
    }

    /// Wait for `delay` while still reading the socket, so heartbeat acks
    /// keep being recorded.
    async fn pause(&mut self, delay: Duration) -> Result<(), GatewayError> {
        let deadline = tokio::time::sleep(delay);
        tokio::pin!(deadline);

        loop {
            let payload = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
                () = &mut deadline => return Ok(()),
                result = self.reader.next_payload() => result?,
            };

            if !is_liveness(&payload) {
                debug!(payload = payload.name(), "Ignoring payload while waiting to identify");
            }
        }
    }

    /// Next non-liveness payload.
    async fn next(&mut self) -> Result<Payload, GatewayError> {
        loop {
            let payload = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
                result = self.reader.next_payload() => result?,
            };

            if !is_liveness(&payload) {
                return Ok(payload);
            }
        }
    }
}
