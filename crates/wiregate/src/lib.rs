//! # wiregate
//!
//! Resilient client for a WebSocket real-time event gateway.
//!
//! A [`GatewayClient`] keeps one session alive against the gateway,
//! heartbeating, resuming or re-identifying after interruptions, and fans
//! every received event out to subscribed [`Responder`]s.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod transport;

pub use config::GatewayConfig;
pub use endpoint::{EndpointError, EndpointProvider, GatewayEndpoint, RestEndpoint, StaticEndpoint};
pub use error::GatewayError;
pub use gateway::{
    ConnectionStatus, FnResponder, GatewayClient, HeartbeatConfig, ReconnectConfig, Responder,
    ResponderRegistry, SessionConfig,
};
pub use transport::{Connector, Frame, FrameSink, FrameStream, TransportError, WsConnector};

/// Protocol types, re-exported for convenience.
pub use wiregate_proto as proto;
