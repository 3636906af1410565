//! Socket transport.
//!
//! The connection engine only talks to the socket through [`Connector`],
//! [`FrameSink`] and [`FrameStream`], so the sender and receiver tasks can
//! each own one half. [`WsConnector`] implements them over
//! `tokio-tungstenite`.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;
use wiregate_proto::CloseCode;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// A frame could not be sent.
    #[error("failed to send: {0}")]
    Send(String),

    /// A frame could not be received.
    #[error("failed to receive: {0}")]
    Receive(String),

    /// The connection ended without a close frame.
    #[error("connection closed")]
    Closed,
}

/// One unit read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A fragment of a data message. The message is complete when
    /// `is_final` is set.
    Data {
        /// Fragment bytes.
        bytes: Vec<u8>,
        /// Whether this fragment ends the message.
        is_final: bool,
    },
    /// The peer closed the connection.
    Close {
        /// Close code, if the peer sent one.
        code: Option<CloseCode>,
        /// Close reason.
        reason: String,
    },
}

/// The two halves of an open socket.
pub type SocketHalves = (Box<dyn FrameSink>, Box<dyn FrameStream>);

/// Opens sockets.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`.
    async fn connect(&self, url: &Url) -> Result<SocketHalves, TransportError>;
}

/// Write half of a socket.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one fragment; the message is complete when `is_final` is set.
    ///
    /// Implementations may buffer non-final fragments and put the whole
    /// message on the wire once the final one arrives. The peer sees the
    /// same message either way; only the on-wire framing may differ.
    async fn send_frame(&mut self, bytes: Vec<u8>, is_final: bool) -> Result<(), TransportError>;

    /// Send a close frame and shut the write half down.
    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError>;
}

/// Read half of a socket.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next frame.
    async fn receive_frame(&mut self) -> Result<Frame, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport backed by `tokio-tungstenite`.
///
/// Outbound fragments are joined and sent as a single message; the socket
/// never emits continuation frames. Inbound continuation frames are
/// reassembled by tungstenite before they reach [`FrameStream`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<SocketHalves, TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (write, read) = ws_stream.split();
        Ok((
            Box::new(WsSink {
                write,
                pending: Vec::new(),
            }),
            Box::new(WsFrames { read }),
        ))
    }
}

struct WsSink {
    write: SplitSink<WsStream, Message>,
    pending: Vec<u8>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frame(&mut self, bytes: Vec<u8>, is_final: bool) -> Result<(), TransportError> {
        // tungstenite sends whole messages, so fragments are joined here.
        self.pending.extend_from_slice(&bytes);
        if !is_final {
            return Ok(());
        }

        let message = match String::from_utf8(std::mem::take(&mut self.pending)) {
            Ok(text) => Message::text(text),
            Err(e) => Message::binary(e.into_bytes()),
        };

        self.write
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: code.0.into(),
            reason: reason.to_string().into(),
        };

        match self.write.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
            Err(e) => return Err(TransportError::Send(e.to_string())),
        }

        match self.write.close().await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

struct WsFrames {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WsFrames {
    async fn receive_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Frame::Data {
                        bytes: text.as_bytes().to_vec(),
                        is_final: true,
                    });
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Frame::Data {
                        bytes: bytes.to_vec(),
                        is_final: true,
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    return Ok(match frame {
                        Some(frame) => Frame::Close {
                            code: Some(CloseCode(frame.code.into())),
                            reason: frame.reason.as_str().to_string(),
                        },
                        None => Frame::Close {
                            code: None,
                            reason: String::new(),
                        },
                    });
                }
                // Ping, Pong and raw frames are handled by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
                None => return Err(TransportError::Closed),
            }
        }
    }
}
