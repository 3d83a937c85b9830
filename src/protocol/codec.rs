//! Encoding between [`MatchMessage`] and the raw `{op_code, payload}` form.

use super::message::{
    JoinAck, MatchEnd, MatchMessage, MoveIntent, OpCode, PresenceChange, StateUpdate,
};
use derive_more::{Display, Error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message as carried on the wire before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Numeric op code.
    pub op_code: u8,
    /// Structured payload.
    #[serde(default)]
    pub payload: Value,
}

/// Malformed input at the protocol boundary. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ProtocolError {
    /// Payload did not match its op code, or the op code is unknown.
    #[display("Malformed message (op code {op_code}): {reason}")]
    MalformedMessage {
        /// Op code as received.
        op_code: u8,
        /// Decoder diagnostic.
        reason: String,
    },

    /// A line on the link was not a valid frame.
    #[display("Garbled frame: {}", _0)]
    GarbledFrame(#[error(not(source))] String),

    /// A value could not be serialized.
    #[display("Failed to encode: {}", _0)]
    Encode(#[error(not(source))] String),
}

/// Encodes a message into its raw form.
pub fn encode(message: &MatchMessage) -> Result<RawMessage, ProtocolError> {
    let payload = match message {
        MatchMessage::MoveIntent(p) => serde_json::to_value(p),
        MatchMessage::JoinAck(p) => serde_json::to_value(p),
        MatchMessage::MatchEnd(p) => serde_json::to_value(p),
        MatchMessage::StateUpdate(p) => serde_json::to_value(p),
        MatchMessage::PresenceChange(p) => serde_json::to_value(p),
    }
    .map_err(|e| ProtocolError::Encode(e.to_string()))?;

    Ok(RawMessage {
        op_code: message.op_code().code(),
        payload,
    })
}

/// Decodes a raw message into the closed variant for its op code.
///
/// Unknown payload fields are ignored.
pub fn decode(raw: &RawMessage) -> Result<MatchMessage, ProtocolError> {
    let op = OpCode::from_code(raw.op_code).ok_or_else(|| ProtocolError::MalformedMessage {
        op_code: raw.op_code,
        reason: "unknown op code".to_string(),
    })?;

    let message = match op {
        OpCode::MoveIntent => MatchMessage::MoveIntent(payload::<MoveIntent>(raw)?),
        OpCode::JoinAck => MatchMessage::JoinAck(payload::<JoinAck>(raw)?),
        OpCode::MatchEnd => MatchMessage::MatchEnd(payload::<MatchEnd>(raw)?),
        OpCode::StateUpdate => MatchMessage::StateUpdate(payload::<StateUpdate>(raw)?),
        OpCode::PresenceChange => MatchMessage::PresenceChange(payload::<PresenceChange>(raw)?),
    };
    Ok(message)
}

fn payload<T: DeserializeOwned>(raw: &RawMessage) -> Result<T, ProtocolError> {
    T::deserialize(&raw.payload).map_err(|e| ProtocolError::MalformedMessage {
        op_code: raw.op_code,
        reason: e.to_string(),
    })
}
