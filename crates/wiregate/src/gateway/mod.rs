//! Gateway connection engine.
//!
//! Drives one logical connection to the gateway: endpoint lookup, socket
//! setup, the identify/resume handshake, heartbeating, receiving, event
//! fan-out to responders, and reconnection when the connection drops.

mod client;
mod dispatch;
mod heartbeat;
mod receiver;
mod reconnect;
mod session;
mod state;

pub use client::GatewayClient;
pub use dispatch::{FnResponder, Responder, ResponderRegistry};
pub use heartbeat::HeartbeatConfig;
pub use reconnect::{classify, classify_close_code, ReconnectConfig, Recovery};
pub use session::SessionConfig;
pub use state::{AtomicConnectionStatus, ConnectionStatus, SessionState};
