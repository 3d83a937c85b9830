//! Match protocol: op-coded messages and the line-framed wire envelope.

mod codec;
mod frame;
mod message;

pub use codec::{ProtocolError, RawMessage, decode, encode};
pub use frame::{
    Difficulty, Frame, FrameCodec, MAX_LINE_LENGTH, RoomSummary, decode_line, encode_line,
};
pub use message::{
    JoinAck, MatchEnd, MatchMessage, MoveIntent, OpCode, Outcome, PresenceChange, StateUpdate,
};
