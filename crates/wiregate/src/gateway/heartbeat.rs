//! Sender loop: heartbeats plus queued outbound payloads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wiregate_proto::{Payload, PayloadCodec};

use super::state::SessionState;
use crate::config::duration_ms;
use crate::error::GatewayError;
use crate::transport::FrameSink;

/// Configuration for heartbeat timing.
///
/// The heartbeat interval itself comes from the gateway's `Hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// How long before the interval elapses a heartbeat is sent.
    #[serde(rename = "safety_margin_ms", with = "duration_ms")]
    pub safety_margin: Duration,
    /// Longest the sender sleeps between checks.
    #[serde(rename = "max_idle_wait_ms", with = "duration_ms")]
    pub max_idle_wait: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_millis(100),
            max_idle_wait: Duration::from_millis(100),
        }
    }
}

/// Queue of pre-encoded application payloads, shared across connection
/// attempts. Only the live sender holds the lock.
pub(crate) type OutboundQueue = Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

/// Everything the sender task owns for one connection attempt.
pub(crate) struct Sender {
    pub sink: Box<dyn FrameSink>,
    pub codec: Arc<dyn PayloadCodec>,
    pub session: Arc<SessionState>,
    /// Handshake payloads; sent ahead of application payloads.
    pub control: mpsc::UnboundedReceiver<Payload>,
    pub outbound: OutboundQueue,
    /// Set once the handshake has completed for this attempt.
    pub outbound_open: Arc<AtomicBool>,
    pub interval: Duration,
    pub config: HeartbeatConfig,
}

/// Result of a sender task. Hands the sink back so the socket can be closed.
pub(crate) struct SenderExit {
    pub sink: Box<dyn FrameSink>,
    pub result: Result<(), GatewayError>,
}

enum Outgoing {
    Control(Payload),
    Application(Vec<u8>),
}

impl Sender {
    /// Start the sender task.
    pub(crate) fn spawn(self, cancel: CancellationToken) -> JoinHandle<SenderExit> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) -> SenderExit {
        let queue = Arc::clone(&self.outbound);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(()),
            mut outbound = queue.lock_owned() => self.send_loop(&mut outbound, &cancel).await,
        };

        if let Err(e) = &result {
            debug!(error = %e, "Sender stopped");
        }

        SenderExit {
            sink: self.sink,
            result,
        }
    }

    async fn send_loop(
        &mut self,
        outbound: &mut mpsc::UnboundedReceiver<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let due_after = self.interval.saturating_sub(self.config.safety_margin);
        let mut last_heartbeat: Option<Instant> = None;

        loop {
            let now = Instant::now();

            // Server-requested heartbeats leave the regular schedule alone.
            if self.session.take_heartbeat_request() {
                self.send_heartbeat(cancel).await?;
                continue;
            }

            let deadline = last_heartbeat.map_or(now, |sent| sent + due_after);
            if now >= deadline {
                if let Some(sent) = last_heartbeat {
                    if !self.session.acked_since(sent) {
                        warn!(
                            interval_ms = self.interval.as_millis() as u64,
                            "Heartbeat was not acknowledged"
                        );
                        return Err(GatewayError::HeartbeatTimeout);
                    }
                }

                self.send_heartbeat(cancel).await?;
                last_heartbeat = Some(now);
                continue;
            }

            let idle = (deadline - now).min(self.config.max_idle_wait);
            let open = self.outbound_open.load(Ordering::SeqCst);
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                Some(payload) = self.control.recv() => Outgoing::Control(payload),
                Some(frame) = outbound.recv(), if open => Outgoing::Application(frame),
                () = sleep(idle) => continue,
            };

            match next {
                Outgoing::Control(payload) => {
                    debug!(payload = payload.name(), "Sending handshake payload");
                    let bytes = self.codec.encode(&payload)?;
                    self.send(bytes, cancel).await?;
                }
                Outgoing::Application(bytes) => {
                    trace!(len = bytes.len(), "Sending queued payload");
                    self.send(bytes, cancel).await?;
                }
            }
        }
    }

    async fn send_heartbeat(&mut self, cancel: &CancellationToken) -> Result<(), GatewayError> {
        let last_sequence = self.session.last_sequence();
        trace!(?last_sequence, "Sending heartbeat");
        let bytes = self.codec.encode(&Payload::Heartbeat { last_sequence })?;
        self.send(bytes, cancel).await
    }

    async fn send(&mut self, bytes: Vec<u8>, cancel: &CancellationToken) -> Result<(), GatewayError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(()),
            result = self.sink.send_frame(bytes, true) => result.map_err(GatewayError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use wiregate_proto::{CloseCode, JsonCodec};

    struct ChannelSink(mpsc::UnboundedSender<Vec<u8>>);

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn send_frame(&mut self, bytes: Vec<u8>, _is_final: bool) -> Result<(), TransportError> {
            self.0.send(bytes).map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self, _code: CloseCode, _reason: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct Harness {
        session: Arc<SessionState>,
        control: mpsc::UnboundedSender<Payload>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        open: Arc<AtomicBool>,
        sent: mpsc::UnboundedReceiver<Vec<u8>>,
        cancel: CancellationToken,
        handle: JoinHandle<SenderExit>,
    }

    fn start(interval: Duration) -> Harness {
        let (sink_tx, sent) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let session = Arc::new(SessionState::new());
        let open = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let sender = Sender {
            sink: Box::new(ChannelSink(sink_tx)),
            codec: Arc::new(JsonCodec),
            session: Arc::clone(&session),
            control: control_rx,
            outbound: Arc::new(Mutex::new(outbound_rx)),
            outbound_open: Arc::clone(&open),
            interval,
            config: HeartbeatConfig::default(),
        };
        let handle = sender.spawn(cancel.clone());

        Harness {
            session,
            control,
            outbound,
            open,
            sent,
            cancel,
            handle,
        }
    }

    fn decode(bytes: &[u8]) -> Payload {
        JsonCodec.decode(bytes).expect("sent payload decodes")
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_heartbeat_is_immediate() {
        let mut h = start(Duration::from_secs(40));
        h.session.observe_sequence(3);

        let first = decode(&h.sent.recv().await.expect("heartbeat"));
        assert!(matches!(first, Payload::Heartbeat { .. }));

        h.cancel.cancel();
        let exit = h.handle.await.expect("join");
        assert!(exit.result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ack_times_out() {
        let mut h = start(Duration::from_secs(1));
        h.sent.recv().await.expect("first heartbeat");

        let exit = h.handle.await.expect("join");
        assert!(matches!(exit.result, Err(GatewayError::HeartbeatTimeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acked_heartbeats_continue_with_sequence() {
        let mut h = start(Duration::from_secs(1));
        let start = Instant::now();

        h.sent.recv().await.expect("first heartbeat");
        h.session.record_ack();
        h.session.observe_sequence(9);

        let second = decode(&h.sent.recv().await.expect("second heartbeat"));
        assert_eq!(second, Payload::Heartbeat { last_sequence: Some(9) });
        assert!(start.elapsed() <= Duration::from_secs(1));

        h.cancel.cancel();
        assert!(h.handle.await.expect("join").result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_application_payloads_wait_for_handshake() {
        let mut h = start(Duration::from_secs(60));
        h.sent.recv().await.expect("first heartbeat");

        h.outbound.send(b"app".to_vec()).expect("queue");
        h.control
            .send(Payload::Heartbeat { last_sequence: None })
            .expect("control");

        let control = decode(&h.sent.recv().await.expect("control payload"));
        assert!(matches!(control, Payload::Heartbeat { .. }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.sent.try_recv().is_err());

        h.open.store(true, Ordering::SeqCst);
        assert_eq!(h.sent.recv().await.expect("application payload"), b"app");

        h.cancel.cancel();
        let _ = h.handle.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_heartbeat_request_is_answered() {
        let mut h = start(Duration::from_secs(60));
        h.sent.recv().await.expect("first heartbeat");

        h.session.request_heartbeat();
        let answer = decode(&h.sent.recv().await.expect("requested heartbeat"));
        assert!(matches!(answer, Payload::Heartbeat { .. }));

        h.cancel.cancel();
        assert!(h.handle.await.expect("join").result.is_ok());
    }
}
