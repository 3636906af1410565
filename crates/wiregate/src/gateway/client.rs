//! Gateway client: connection lifecycle, reconnection and the public API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wiregate_proto::{CloseCode, JsonCodec, Payload, PayloadCodec};

use super::dispatch::{Dispatcher, Responder, ResponderRegistry};
use super::heartbeat::{OutboundQueue, Sender, SenderExit};
use super::receiver::{spawn_receiver, PayloadReader};
use super::reconnect::{classify, Recovery};
use super::session::Handshake;
use super::state::{AtomicConnectionStatus, ConnectionStatus, SessionState};
use crate::config::GatewayConfig;
use crate::endpoint::EndpointProvider;
use crate::error::GatewayError;
use crate::transport::{Connector, FrameSink, WsConnector};

/// How often the control task wakes to reap finished responders.
const TICK: Duration = Duration::from_millis(50);

/// How long to wait for the close frame to go out during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the real-time gateway.
///
/// Create one, [`subscribe`](Self::subscribe) responders, then drive it with
/// [`run`](Self::run) until the cancellation token fires or an
/// unrecoverable error occurs. Outbound commands can be
/// [`submit`](Self::submit)ted at any time; they are sent once a session is
/// established.
pub struct GatewayClient {
    config: Arc<GatewayConfig>,
    endpoint: Arc<dyn EndpointProvider>,
    connector: Arc<dyn Connector>,
    codec: Arc<dyn PayloadCodec>,
    responders: Arc<ResponderRegistry>,
    session: Arc<SessionState>,
    status: AtomicConnectionStatus,
    running: AtomicBool,
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    outbound_rx: OutboundQueue,
}

/// How a single connection attempt ended.
enum Ended {
    /// Cancelled from outside.
    Stopped,
    /// The gateway asked us to reconnect.
    Reconnect,
    /// The connection failed.
    Failed(GatewayError),
}

/// State that lives for one `run` invocation.
struct RunState {
    inbound_tx: mpsc::UnboundedSender<Payload>,
    inbound_rx: mpsc::UnboundedReceiver<Payload>,
    dispatcher: Dispatcher,
    /// Whether any handshake has succeeded during this run.
    established: bool,
    /// Consecutive failed attempts.
    failures: u32,
}

/// Resources of one connection attempt that teardown must release.
#[derive(Default)]
struct Connection {
    sink: Option<Box<dyn FrameSink>>,
    sender: Option<JoinHandle<SenderExit>>,
    receiver: Option<JoinHandle<Result<(), GatewayError>>>,
}

enum Activity {
    Stop,
    Inbound(Payload),
    SenderExited(Result<SenderExit, JoinError>),
    ReceiverExited(Result<Result<(), GatewayError>, JoinError>),
    Tick,
}

/// Resets the running flag and status even if `run` is dropped mid-flight.
struct RunGuard<'a> {
    client: &'a GatewayClient,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.client.status.store(ConnectionStatus::Offline);
        self.client.running.store(false, Ordering::SeqCst);
    }
}

impl GatewayClient {
    /// Create a client using the WebSocket transport and JSON codec.
    pub fn new(config: GatewayConfig, endpoint: Arc<dyn EndpointProvider>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            config: Arc::new(config),
            endpoint,
            connector: Arc::new(WsConnector),
            codec: Arc::new(JsonCodec),
            responders: Arc::new(ResponderRegistry::new()),
            session: Arc::new(SessionState::new()),
            status: AtomicConnectionStatus::new(ConnectionStatus::Offline),
            running: AtomicBool::new(false),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
        }
    }

    /// Replace the transport.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Replace the payload codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status.load()
    }

    /// Current session id, if a session has been established.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session.session_id()
    }

    /// Highest sequence number received in the current session.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.session.last_sequence()
    }

    /// Subscribe a responder. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, responder: Arc<dyn Responder>) -> bool {
        self.responders.subscribe(responder)
    }

    /// Unsubscribe a responder. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, responder: &Arc<dyn Responder>) -> bool {
        self.responders.unsubscribe(responder)
    }

    /// Queue a command for sending.
    ///
    /// The payload is encoded immediately, so oversized payloads are rejected
    /// here. Queued payloads survive reconnects and are sent in order once a
    /// session is established.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotACommand`] for payloads an application may
    /// not send, or [`GatewayError::Codec`] if encoding fails.
    pub fn submit(&self, payload: &Payload) -> Result<(), GatewayError> {
        if !payload.is_command() {
            return Err(GatewayError::NotACommand(payload.name().to_string()));
        }

        let bytes = self.codec.encode(payload)?;
        self.outbound_tx
            .send(bytes)
            .map_err(|_| GatewayError::TaskFailed {
                task: "outbound",
                reason: "queue closed".to_string(),
            })
    }

    /// Connect and process events until `cancel` fires or an unrecoverable
    /// error occurs.
    ///
    /// Returns `Ok(())` after cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AlreadyRunning`] if another `run` is active,
    /// the error that ended the connection if it cannot be recovered, or
    /// [`GatewayError::ReconnectExhausted`] once reconnect attempts run out.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), GatewayError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::AlreadyRunning);
        }
        let _guard = RunGuard { client: self };

        self.config.validate()?;
        self.status.store(ConnectionStatus::Disconnected);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let mut run = RunState {
            inbound_tx,
            inbound_rx,
            dispatcher: Dispatcher::new(Arc::clone(&self.responders)),
            established: false,
            failures: 0,
        };

        loop {
            let attempt = cancel.child_token();
            let _attempt_guard = attempt.clone().drop_guard();

            let ended = self.connection(&mut run, &attempt).await;
            self.status.store(ConnectionStatus::Disconnected);

            if cancel.is_cancelled() {
                info!("Gateway client stopped");
                return Ok(());
            }

            let error = match ended {
                Ended::Stopped => {
                    info!("Gateway client stopped");
                    return Ok(());
                }
                Ended::Reconnect => {
                    info!("Reconnecting at the gateway's request");
                    continue;
                }
                Ended::Failed(error) => error,
            };

            if !run.established {
                error!(error = %error, "Failed to establish a gateway session");
                return Err(error);
            }

            // A reconnect request that raced with a failure still wins.
            let recovery = if self.session.take_reconnect_request() {
                Recovery::Resume
            } else {
                classify(&error)
            };

            match recovery {
                Recovery::Fatal => {
                    error!(error = %error, "Gateway connection failed");
                    return Err(error);
                }
                Recovery::Fresh => {
                    warn!(error = %error, "Gateway connection lost, starting a new session");
                    self.session.clear();
                }
                Recovery::Resume => {
                    warn!(error = %error, "Gateway connection lost, resuming session");
                }
            }

            run.failures += 1;
            if !self.config.reconnect.should_reconnect(run.failures) {
                error!(attempts = run.failures, "Giving up on the gateway connection");
                return Err(GatewayError::ReconnectExhausted {
                    attempts: run.failures,
                    last: Box::new(error),
                });
            }

            if run.failures > 1 {
                let delay = self.config.reconnect.delay_for_attempt(run.failures - 1);
                info!(
                    attempt = run.failures,
                    delay_ms = delay.as_millis() as u64,
                    "Waiting before reconnecting"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        info!("Gateway client stopped");
                        return Ok(());
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Run one connection attempt from endpoint lookup to teardown.
    async fn connection(&self, run: &mut RunState, attempt: &CancellationToken) -> Ended {
        let mut conn = Connection::default();

        let ended = match self.establish(run, attempt, &mut conn).await {
            Ok(()) => self.drive(run, attempt, &mut conn).await,
            Err(GatewayError::Cancelled) => Ended::Stopped,
            Err(e) => Ended::Failed(e),
        };

        self.teardown(run, attempt, conn).await;
        ended
    }

    async fn establish(
        &self,
        run: &mut RunState,
        attempt: &CancellationToken,
        conn: &mut Connection,
    ) -> Result<(), GatewayError> {
        let endpoint = tokio::select! {
            biased;
            () = attempt.cancelled() => return Err(GatewayError::Cancelled),
            result = self.endpoint.gateway_endpoint() => result?,
        };

        let url = endpoint.connect_url(self.config.api_version);
        info!(%url, "Connecting to gateway");

        let (sink, stream) = tokio::select! {
            biased;
            () = attempt.cancelled() => return Err(GatewayError::Cancelled),
            result = self.connector.connect(&url) => result?,
        };

        let mut reader = PayloadReader::new(stream, Arc::clone(&self.codec), Arc::clone(&self.session));
        let interval = match read_hello(&mut reader, attempt).await {
            Ok(interval) => interval,
            Err(e) => {
                conn.sink = Some(sink);
                return Err(e);
            }
        };
        debug!(interval_ms = interval.as_millis() as u64, "Received HELLO");

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let outbound_open = Arc::new(AtomicBool::new(false));
        let sender = conn.sender.insert(
            Sender {
                sink,
                codec: Arc::clone(&self.codec),
                session: Arc::clone(&self.session),
                control: control_rx,
                outbound: Arc::clone(&self.outbound_rx),
                outbound_open: Arc::clone(&outbound_open),
                interval,
                config: self.config.heartbeat.clone(),
            }
            .spawn(attempt.clone()),
        );

        let handshake = Handshake {
            reader: &mut reader,
            control: &control_tx,
            inbound: &run.inbound_tx,
            session: &self.session,
            config: &self.config,
            cancel: attempt,
        };

        let sender_exit = tokio::select! {
            result = handshake.perform() => {
                result?;
                None
            }
            exit = sender => Some(exit),
        };

        if let Some(exit) = sender_exit {
            conn.sender = None;
            return Err(match exit {
                Ok(SenderExit { sink, result }) => {
                    conn.sink = Some(sink);
                    result.err().unwrap_or(GatewayError::Cancelled)
                }
                Err(e) => task_failed("sender", &e),
            });
        }

        conn.receiver = Some(spawn_receiver(reader, run.inbound_tx.clone(), attempt.clone()));
        outbound_open.store(true, Ordering::SeqCst);

        run.established = true;
        run.failures = 0;
        self.status.store(ConnectionStatus::Connected);
        info!(session_id = ?self.session.session_id(), "Connected to gateway");
        Ok(())
    }

    async fn drive(
        &self,
        run: &mut RunState,
        attempt: &CancellationToken,
        conn: &mut Connection,
    ) -> Ended {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let (Some(sender), Some(receiver)) = (conn.sender.as_mut(), conn.receiver.as_mut())
            else {
                return Ended::Failed(GatewayError::TaskFailed {
                    task: "connection",
                    reason: "sender or receiver missing".to_string(),
                });
            };

            let activity = tokio::select! {
                biased;
                () = attempt.cancelled() => Activity::Stop,
                Some(payload) = run.inbound_rx.recv() => Activity::Inbound(payload),
                exit = sender => Activity::SenderExited(exit),
                exit = receiver => Activity::ReceiverExited(exit),
                _ = ticker.tick() => Activity::Tick,
            };

            match activity {
                Activity::Stop => return Ended::Stopped,
                Activity::Inbound(payload) => run.dispatcher.dispatch(payload, attempt),
                Activity::SenderExited(exit) => {
                    conn.sender = None;
                    return match exit {
                        Ok(SenderExit { sink, result }) => {
                            conn.sink = Some(sink);
                            result.map_or_else(Ended::Failed, |()| Ended::Stopped)
                        }
                        Err(e) => Ended::Failed(task_failed("sender", &e)),
                    };
                }
                Activity::ReceiverExited(exit) => {
                    conn.receiver = None;
                    return match exit {
                        Ok(Ok(())) => Ended::Stopped,
                        Ok(Err(e)) => Ended::Failed(e),
                        Err(e) => Ended::Failed(task_failed("receiver", &e)),
                    };
                }
                Activity::Tick => {}
            }

            run.dispatcher.reap_one().await;

            if self.session.take_reconnect_request() {
                return Ended::Reconnect;
            }
        }
    }

    async fn teardown(&self, run: &mut RunState, attempt: &CancellationToken, mut conn: Connection) {
        attempt.cancel();

        if let Some(handle) = conn.sender.take() {
            match handle.await {
                Ok(exit) => conn.sink = Some(exit.sink),
                Err(e) => warn!(error = %e, "Sender task failed"),
            }
        }

        if let Some(handle) = conn.receiver.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Receiver task failed");
            }
        }

        if let Some(mut sink) = conn.sink.take() {
            match tokio::time::timeout(
                CLOSE_TIMEOUT,
                sink.close(CloseCode::NORMAL, "terminating connection"),
            )
            .await
            {
                Ok(Ok(())) => debug!("Closed gateway socket"),
                Ok(Err(e)) => debug!(error = %e, "Failed to close gateway socket"),
                Err(_) => debug!("Timed out closing gateway socket"),
            }
        }

        run.dispatcher.drain(self.config.responder_drain_timeout).await;
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("config", &self.config)
            .field("status", &self.status.load())
            .field("responders", &self.responders)
            .finish_non_exhaustive()
    }
}

async fn read_hello(
    reader: &mut PayloadReader,
    attempt: &CancellationToken,
) -> Result<Duration, GatewayError> {
    let payload = tokio::select! {
        biased;
        () = attempt.cancelled() => return Err(GatewayError::Cancelled),
        result = reader.next_payload() => result?,
    };

    match payload {
        Payload::Hello(hello) if hello.heartbeat_interval > 0 => Ok(hello.interval()),
        Payload::Hello(_) => Err(GatewayError::Protocol(
            "HELLO carried a zero heartbeat interval".to_string(),
        )),
        other => Err(GatewayError::Protocol(format!(
            "expected HELLO, got {}",
            other.name()
        ))),
    }
}

fn task_failed(task: &'static str, error: &JoinError) -> GatewayError {
    GatewayError::TaskFailed {
        task,
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::StaticEndpoint;
    use wiregate_proto::{Activity as PresenceActivity, Status, UpdatePresence};

    fn client() -> GatewayClient {
        let endpoint = StaticEndpoint::parse("ws://127.0.0.1:1").expect("url");
        GatewayClient::new(GatewayConfig::new("token"), Arc::new(endpoint))
    }

    #[test]
    fn test_new_client_is_offline() {
        let client = client();
        assert_eq!(client.status(), ConnectionStatus::Offline);
        assert_eq!(client.session_id(), None);
        assert_eq!(client.last_sequence(), None);
    }

    #[test]
    fn test_submit_rejects_non_commands() {
        let client = client();
        let err = client.submit(&Payload::Reconnect).expect_err("not a command");
        assert!(matches!(err, GatewayError::NotACommand(name) if name == "RECONNECT"));
    }

    #[test]
    fn test_submit_rejects_oversized_payloads() {
        let client = client();
        let payload = Payload::UpdatePresence(UpdatePresence {
            since: None,
            activities: vec![PresenceActivity {
                name: "x".repeat(5000),
                kind: 0,
            }],
            status: Status::Online,
            afk: false,
        });
        assert!(matches!(
            client.submit(&payload),
            Err(GatewayError::Codec(wiregate_proto::ProtoError::PayloadTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_run() {
        let endpoint = StaticEndpoint::parse("ws://127.0.0.1:1").expect("url");
        let client = GatewayClient::new(GatewayConfig::default(), Arc::new(endpoint));

        let result = client.run(CancellationToken::new()).await;
        assert!(matches!(result, Err(GatewayError::Config(_))));
        assert_eq!(client.status(), ConnectionStatus::Offline);
    }

    #[tokio::test]
    async fn test_run_after_cancel_returns_ok() {
        let client = client();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(client.run(cancel).await.is_ok());
        assert_eq!(client.status(), ConnectionStatus::Offline);
    }
}
