//! In-memory gateway for driving a client through scripted scenarios.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;
use wiregate::proto::{
    CloseCode, GatewayEvent, Hello, JsonCodec, Message, Payload, PayloadCodec, Ready, Snowflake,
    TypingStart, User,
};
use wiregate::transport::SocketHalves;
use wiregate::{Connector, Frame, FrameSink, FrameStream, TransportError};

/// How long a test waits for the client before giving up.
pub const WAIT: Duration = Duration::from_secs(30);

// ============================================================================
// Client side
// ============================================================================

/// What the client put on the wire.
#[derive(Debug)]
pub enum ClientFrame {
    Data(Vec<u8>),
    Close(CloseCode, String),
}

struct MockSink {
    tx: mpsc::UnboundedSender<ClientFrame>,
    pending: Vec<u8>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_frame(&mut self, bytes: Vec<u8>, is_final: bool) -> Result<(), TransportError> {
        self.pending.extend_from_slice(&bytes);
        if !is_final {
            return Ok(());
        }
        let message = std::mem::take(&mut self.pending);
        self.tx
            .send(ClientFrame::Data(message))
            .map_err(|_| TransportError::Send("server went away".to_string()))
    }

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        let _ = self.tx.send(ClientFrame::Close(code, reason.to_string()));
        Ok(())
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn receive_frame(&mut self) -> Result<Frame, TransportError> {
        self.rx.recv().await.unwrap_or(Err(TransportError::Closed))
    }
}

/// Connector handing every new socket to a [`MockServer`].
pub struct MockConnector {
    accepted: mpsc::UnboundedSender<ServerSide>,
    connects: AtomicUsize,
}

impl MockConnector {
    /// Number of sockets opened so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<SocketHalves, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        self.accepted
            .send(ServerSide {
                url: url.clone(),
                to_client: server_tx,
                from_client: client_rx,
            })
            .map_err(|_| TransportError::Connect("mock server is gone".to_string()))?;

        Ok((
            Box::new(MockSink {
                tx: client_tx,
                pending: Vec::new(),
            }),
            Box::new(MockStream { rx: server_rx }),
        ))
    }
}

/// Create a connector and the server that receives its sockets.
pub fn mock_gateway() -> (Arc<MockConnector>, MockServer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(MockConnector {
            accepted: tx,
            connects: AtomicUsize::new(0),
        }),
        MockServer { accepted: rx },
    )
}

// ============================================================================
// Server side
// ============================================================================

/// Accepts sockets opened by a [`MockConnector`].
pub struct MockServer {
    accepted: mpsc::UnboundedReceiver<ServerSide>,
}

impl MockServer {
    /// Wait for the client to open a socket.
    pub async fn accept(&mut self) -> ServerSide {
        timeout(WAIT, self.accepted.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Accept a socket, send `Hello`, expect `Identify` and answer `Ready`.
    pub async fn accept_identify(&mut self, interval_ms: u64, session_id: &str) -> ServerSide {
        let mut conn = self.accept().await;
        conn.hello(interval_ms);
        match conn.next_non_heartbeat().await {
            Payload::Identify(identify) => assert_eq!(identify.token, "token"),
            other => panic!("expected IDENTIFY, got {other:?}"),
        }
        conn.send(&ready(1, session_id));
        conn
    }
}

/// The gateway's end of one socket.
pub struct ServerSide {
    pub url: Url,
    to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<ClientFrame>,
}

impl ServerSide {
    /// Send a payload as one frame.
    pub fn send(&self, payload: &Payload) {
        let bytes = JsonCodec.encode(payload).expect("encode");
        self.send_raw(bytes, true);
    }

    /// Send a payload split into `parts` fragments.
    pub fn send_fragmented(&self, payload: &Payload, parts: usize) {
        let bytes = JsonCodec.encode(payload).expect("encode");
        let chunk = bytes.len().div_ceil(parts);
        let chunks: Vec<&[u8]> = bytes.chunks(chunk).collect();
        let last = chunks.len() - 1;
        for (i, part) in chunks.into_iter().enumerate() {
            self.send_raw(part.to_vec(), i == last);
        }
    }

    /// Send raw bytes.
    pub fn send_raw(&self, bytes: Vec<u8>, is_final: bool) {
        let _ = self.to_client.send(Ok(Frame::Data { bytes, is_final }));
    }

    /// Send `Hello` with the given heartbeat interval.
    pub fn hello(&self, interval_ms: u64) {
        self.send(&Payload::Hello(Hello {
            heartbeat_interval: interval_ms,
        }));
    }

    /// Close the connection with a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Ok(Frame::Close {
            code: Some(CloseCode(code)),
            reason: reason.to_string(),
        }));
    }

    /// Wait for the next frame from the client.
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for the client")
    }

    /// Wait for the next payload, acknowledging nothing.
    pub async fn recv_payload(&mut self) -> Payload {
        match self.recv().await {
            Some(ClientFrame::Data(bytes)) => JsonCodec.decode(&bytes).expect("client payload decodes"),
            other => panic!("expected a payload, got {other:?}"),
        }
    }

    /// Wait for the next payload that is not a heartbeat, acknowledging any
    /// heartbeats on the way.
    pub async fn next_non_heartbeat(&mut self) -> Payload {
        loop {
            match self.recv_payload().await {
                Payload::Heartbeat { .. } => self.send(&Payload::HeartbeatAck),
                other => return other,
            }
        }
    }

    /// Wait for the client to close the socket, acknowledging heartbeats.
    /// Returns the close code, or `None` if the socket just went away.
    pub async fn closed(&mut self) -> Option<CloseCode> {
        loop {
            match self.recv().await {
                Some(ClientFrame::Close(code, _)) => return Some(code),
                Some(ClientFrame::Data(bytes)) => {
                    if let Ok(Payload::Heartbeat { .. }) = JsonCodec.decode(&bytes) {
                        self.send(&Payload::HeartbeatAck);
                    }
                }
                None => return None,
            }
        }
    }
}

// ============================================================================
// Payload helpers
// ============================================================================

pub fn ready(sequence: u64, session_id: &str) -> Payload {
    Payload::Ready {
        sequence,
        ready: Ready {
            version: 10,
            user: User {
                id: Snowflake::new(100),
                username: "bot".to_string(),
                bot: true,
            },
            session_id: session_id.to_string(),
            guilds: Vec::new(),
        },
    }
}

pub fn message_create(sequence: u64, content: &str) -> Payload {
    Payload::Dispatch {
        sequence,
        event: GatewayEvent::MessageCreate(Message {
            id: Snowflake::new(sequence),
            channel_id: Snowflake::new(7),
            guild_id: None,
            author: None,
            content: content.to_string(),
        }),
    }
}

pub fn typing_start(sequence: u64) -> Payload {
    Payload::Dispatch {
        sequence,
        event: GatewayEvent::TypingStart(TypingStart {
            channel_id: Snowflake::new(7),
            guild_id: None,
            user_id: Snowflake::new(8),
            timestamp: 1_700_000_000,
        }),
    }
}

/// Poll `condition` until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}
