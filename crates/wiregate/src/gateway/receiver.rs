//! Receiver loop and the payload reader it is built on.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wiregate_proto::{Payload, PayloadCodec};

use super::state::SessionState;
use crate::error::GatewayError;
use crate::transport::{Frame, FrameStream, TransportError};

/// Whether a payload only exists to keep the connection alive.
///
/// Liveness payloads are consumed by [`PayloadReader`] side effects and never
/// reach the inbound queue.
pub(crate) const fn is_liveness(payload: &Payload) -> bool {
    matches!(payload, Payload::HeartbeatAck | Payload::Heartbeat { .. })
}

/// Reads payloads from the socket and records their side effects on the
/// session.
///
/// Used by the handshake first and then moved into the receiver task.
pub(crate) struct PayloadReader {
    stream: Box<dyn FrameStream>,
    codec: Arc<dyn PayloadCodec>,
    session: Arc<SessionState>,
    buffer: Vec<u8>,
}

impl PayloadReader {
    pub(crate) fn new(
        stream: Box<dyn FrameStream>,
        codec: Arc<dyn PayloadCodec>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            stream,
            codec,
            session,
            buffer: Vec::new(),
        }
    }

    /// Read the next decodable payload.
    ///
    /// Fragments are joined until a final one arrives. Messages that fail to
    /// decode are logged and skipped. A close frame ends the read with the
    /// peer's close code.
    ///
    /// Cancel safe: a partially received message stays buffered.
    pub(crate) async fn next_payload(&mut self) -> Result<Payload, GatewayError> {
        loop {
            match self.stream.receive_frame().await? {
                Frame::Data { bytes, is_final } => {
                    self.buffer.extend_from_slice(&bytes);
                    if !is_final {
                        continue;
                    }

                    let message = std::mem::take(&mut self.buffer);
                    match self.codec.decode(&message) {
                        Ok(payload) => {
                            self.observe(&payload);
                            return Ok(payload);
                        }
                        Err(e) => {
                            warn!(error = %e, len = message.len(), "Failed to decode gateway payload");
                        }
                    }
                }
                Frame::Close {
                    code: Some(code),
                    reason,
                } => {
                    debug!(%code, %reason, "Gateway closed the connection");
                    return Err(GatewayError::Closed { code, reason });
                }
                Frame::Close { code: None, .. } => {
                    return Err(TransportError::Closed.into());
                }
            }
        }
    }

    fn observe(&self, payload: &Payload) {
        if let Some(sequence) = payload.sequence() {
            self.session.observe_sequence(sequence);
        }

        match payload {
            Payload::HeartbeatAck => {
                trace!("Heartbeat acknowledged");
                self.session.record_ack();
            }
            Payload::Reconnect => {
                debug!("Gateway requested a reconnect");
                self.session.request_reconnect();
            }
            Payload::Heartbeat { .. } => {
                debug!("Gateway requested a heartbeat");
                self.session.request_heartbeat();
            }
            _ => {}
        }
    }
}

/// Start the receiver task.
///
/// Forwards every non-liveness payload to `inbound` until cancelled, until
/// the inbound queue is gone, or until the socket fails.
pub(crate) fn spawn_receiver(
    reader: PayloadReader,
    inbound: mpsc::UnboundedSender<Payload>,
    cancel: CancellationToken,
) -> JoinHandle<Result<(), GatewayError>> {
    tokio::spawn(receive_loop(reader, inbound, cancel))
}

async fn receive_loop(
    mut reader: PayloadReader,
    inbound: mpsc::UnboundedSender<Payload>,
    cancel: CancellationToken,
) -> Result<(), GatewayError> {
    loop {
        let payload = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            result = reader.next_payload() => result?,
        };

        if is_liveness(&payload) {
            continue;
        }

        trace!(payload = payload.name(), sequence = ?payload.sequence(), "Received payload");
        if inbound.send(payload).is_err() {
            return Ok(());
        }
    }
}
