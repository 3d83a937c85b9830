//! Wire envelope and line codec.
//!
//! One JSON object per line. Control frames carry the handshake, room
//! management and heartbeats; `data` frames carry [`RawMessage`]s for a
//! specific match.

use super::codec::{ProtocolError, RawMessage};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Longest line accepted from a peer.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Bot difficulty, forwarded to the host without interpretation.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Difficulty {
    /// Easy.
    Easy,
    /// Medium.
    #[default]
    Medium,
    /// Hard.
    Hard,
}

/// Entry returned by room discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct RoomSummary {
    /// Host-assigned match id.
    pub match_id: String,
    /// Seated participants.
    pub occupancy: usize,
}

/// Everything that travels over a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First client frame; presents the opaque credential.
    Authenticate {
        /// Credential token.
        token: String,
    },
    /// Handshake accepted.
    Welcome {
        /// Host-side identity of this connection.
        user_id: String,
    },
    /// Open a new match.
    Create {
        /// Fill the second seat with a bot.
        vs_bot: bool,
        /// Bot difficulty.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
    },
    /// Take a seat in an existing match.
    Join {
        /// Match to join.
        match_id: String,
    },
    /// Leave the current match.
    Leave,
    /// A request was refused.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
    /// Ask for open rooms.
    ListRooms,
    /// Room listing.
    Rooms {
        /// Known rooms.
        rooms: Vec<RoomSummary>,
    },
    /// Heartbeat probe.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Match message.
    Data {
        /// Match the message belongs to.
        match_id: String,
        /// Numeric op code.
        op_code: u8,
        /// Structured payload.
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl Frame {
    /// Wraps a raw match message for `match_id`.
    pub fn data(match_id: impl Into<String>, raw: RawMessage) -> Self {
        Frame::Data {
            match_id: match_id.into(),
            op_code: raw.op_code,
            payload: raw.payload,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Authenticate { .. } => "authenticate",
            Frame::Welcome { .. } => "welcome",
            Frame::Create { .. } => "create",
            Frame::Join { .. } => "join",
            Frame::Leave => "leave",
            Frame::Rejected { .. } => "rejected",
            Frame::ListRooms => "list_rooms",
            Frame::Rooms { .. } => "rooms",
            Frame::Ping => "ping",
            Frame::Pong => "pong",
            Frame::Data { .. } => "data",
        }
    }
}

/// Serializes a frame to a single line (without the newline).
pub fn encode_line(frame: &Frame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Parses one line into a frame.
pub fn decode_line(line: &str) -> Result<Frame, ProtocolError> {
    serde_json::from_str(line).map_err(|e| ProtocolError::GarbledFrame(e.to_string()))
}

/// `tokio_util` codec for newline-delimited JSON frames.
///
/// A line that is not a valid frame decodes to `Some(Err(_))` and the stream
/// continues with the next line.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    lines: LinesCodec,
}

impl FrameCodec {
    /// Creates a codec with the default line limit.
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Result<Frame, ProtocolError>;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let line = self.lines.decode(src);
        skip_long_line(line)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let line = self.lines.decode_eof(src);
        skip_long_line(line)
    }
}

/// `LinesCodec` discards the rest of an over-long line on its own, so the
/// overflow becomes an item error and the stream stays usable.
fn skip_long_line(
    line: Result<Option<String>, LinesCodecError>,
) -> Result<Option<Result<Frame, ProtocolError>>, LinesCodecError> {
    match line {
        Ok(line) => Ok(line.map(|line| decode_line(&line))),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Err(ProtocolError::GarbledFrame(
            format!("line longer than {} bytes", MAX_LINE_LENGTH),
        )))),
        Err(e) => Err(e),
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = encode_line(&frame).map_err(|e| {
            LinesCodecError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            ))
        })?;
        self.lines.encode(line, dst)
    }
}
