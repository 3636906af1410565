//! Translation between typed payloads and wire bytes.
//!
//! Payloads travel in a JSON envelope `{"op": .., "d": .., "s": .., "t": ..}`
//! where `s` and `t` are only present on dispatches.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;
use crate::event::GatewayEvent;
use crate::opcode::OpCode;
use crate::payload::Payload;

/// Hard ceiling on the size of an encoded outbound payload.
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// Encodes outbound payloads and decodes inbound ones.
pub trait PayloadCodec: Send + Sync {
    /// Encode a payload to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::PayloadTooLarge`] if the encoded payload exceeds
    /// [`MAX_PAYLOAD_SIZE`], or an encoding error.
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, ProtoError>;

    /// Decode bytes into a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid payload.
    fn decode(&self, bytes: &[u8]) -> Result<Payload, ProtoError>;
}

/// The JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
}

impl PayloadCodec for JsonCodec {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, ProtoError> {
        let bytes = serde_json::to_vec(&to_envelope(payload)?)
            .map_err(|e| ProtoError::Encoding(e.to_string()))?;

        if bytes.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge {
                size: bytes.len(),
                limit: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Payload, ProtoError> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| ProtoError::Decoding(e.to_string()))?;
        from_envelope(envelope)
    }
}

fn to_envelope(payload: &Payload) -> Result<Envelope, ProtoError> {
    let mut s = None;
    let mut t = None;

    let d = match payload {
        Payload::Hello(hello) => to_value(hello)?,
        Payload::Identify(identify) => to_value(identify)?,
        Payload::Resume(resume) => to_value(resume)?,
        Payload::Heartbeat { last_sequence } => to_value(last_sequence)?,
        Payload::HeartbeatAck | Payload::Reconnect => Value::Null,
        Payload::InvalidSession { resumable } => Value::Bool(*resumable),
        Payload::Dispatch { sequence, event } => {
            s = Some(*sequence);
            t = Some(event.name().to_string());
            event.to_value()?
        }
        Payload::Ready { sequence, ready } => {
            s = Some(*sequence);
            t = Some("READY".to_string());
            to_value(ready)?
        }
        Payload::Resumed { sequence } => {
            s = Some(*sequence);
            t = Some("RESUMED".to_string());
            Value::Object(serde_json::Map::new())
        }
        Payload::UpdatePresence(presence) => to_value(presence)?,
        Payload::UpdateVoiceState(voice) => to_value(voice)?,
        Payload::RequestGuildMembers(request) => to_value(request)?,
    };

    Ok(Envelope {
        op: payload.opcode().as_u8(),
        d,
        s,
        t,
    })
}

fn from_envelope(envelope: Envelope) -> Result<Payload, ProtoError> {
    let Envelope { op, d, s, t } = envelope;

    Ok(match OpCode::try_from(op)? {
        OpCode::Dispatch => {
            let sequence = s.ok_or(ProtoError::MissingField("s"))?;
            let name = t.ok_or(ProtoError::MissingField("t"))?;
            match name.as_str() {
                "READY" => Payload::Ready {
                    sequence,
                    ready: data(op, d)?,
                },
                "RESUMED" => Payload::Resumed { sequence },
                _ => Payload::Dispatch {
                    sequence,
                    event: GatewayEvent::from_parts(&name, d)?,
                },
            }
        }
        OpCode::Heartbeat => Payload::Heartbeat {
            last_sequence: data(op, d)?,
        },
        OpCode::Identify => Payload::Identify(data(op, d)?),
        OpCode::PresenceUpdate => Payload::UpdatePresence(data(op, d)?),
        OpCode::VoiceStateUpdate => Payload::UpdateVoiceState(data(op, d)?),
        OpCode::Resume => Payload::Resume(data(op, d)?),
        OpCode::Reconnect => Payload::Reconnect,
        OpCode::RequestGuildMembers => Payload::RequestGuildMembers(data(op, d)?),
        OpCode::InvalidSession => Payload::InvalidSession {
            resumable: data::<Option<bool>>(op, d)?.unwrap_or(false),
        },
        OpCode::Hello => Payload::Hello(data(op, d)?),
        OpCode::HeartbeatAck => Payload::HeartbeatAck,
    })
}

fn data<T: DeserializeOwned>(op: u8, d: Value) -> Result<T, ProtoError> {
    serde_json::from_value(d).map_err(|e| ProtoError::Decoding(format!("op {op}: {e}")))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ProtoError> {
    serde_json::to_value(value).map_err(|e| ProtoError::Encoding(e.to_string()))
}
