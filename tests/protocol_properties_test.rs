//! Property-based tests for the match protocol decoders.

use proptest::prelude::*;
use serde_json::{Value, json};
use strictly_match::{
    Board, Frame, JoinAck, Mark, MatchEnd, MatchMessage, MoveIntent, OpCode, Outcome,
    PresenceChange, ProtocolError, RawMessage, Square, StateUpdate, decode, decode_line, encode,
    encode_line,
};

fn arb_payload() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..10).prop_map(Value::from),
            prop::collection::btree_map("[a-z_]{1,10}", inner, 0..4)
                .prop_map(|map| json!(map)),
        ]
    })
}

fn arb_mark() -> impl Strategy<Value = Mark> {
    prop_oneof![Just(Mark::X), Just(Mark::O)]
}

fn arb_board() -> impl Strategy<Value = Board> {
    prop::array::uniform9(0u8..3).prop_map(|codes| {
        Board::from_squares(codes.map(|c| Square::try_from(c).unwrap_or(Square::Empty)))
    })
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        arb_mark().prop_map(Outcome::Won),
        Just(Outcome::Draw),
        Just(Outcome::Aborted),
        Just(Outcome::Error),
    ]
}

fn arb_message() -> impl Strategy<Value = MatchMessage> {
    prop_oneof![
        (0usize..9).prop_map(|cell| MatchMessage::from(MoveIntent::new(cell))),
        arb_mark().prop_map(|mark| MatchMessage::from(JoinAck::new(mark))),
        arb_outcome().prop_map(|outcome| MatchMessage::from(MatchEnd::new(outcome))),
        (arb_board(), arb_mark(), prop::option::of(any::<u64>()))
            .prop_map(|(board, turn, seq)| MatchMessage::from(StateUpdate::new(board, turn, seq))),
        ("[a-z0-9-]{1,24}", any::<bool>())
            .prop_map(|(player, joined)| MatchMessage::from(PresenceChange::new(player, joined))),
    ]
}

/// Property: every message decodes back to itself, directly and inside a
/// data frame line.
#[test]
fn prop_messages_survive_the_wire() {
    proptest!(|(message in arb_message(), match_id in "[a-z0-9-]{1,16}")| {
        let raw = encode(&message).expect("encodable");
        prop_assert_eq!(raw.op_code, message.op_code().code());
        prop_assert_eq!(&decode(&raw).expect("decodable"), &message);

        let line = encode_line(&Frame::data(match_id.clone(), raw)).expect("encodable frame");
        let Ok(Frame::Data { match_id: id, op_code, payload }) = decode_line(&line) else {
            panic!("expected data frame from {}", line);
        };
        prop_assert_eq!(id, match_id);
        prop_assert_eq!(decode(&RawMessage { op_code, payload }).expect("decodable"), message);
    });
}

/// Property: op codes outside the closed set are always malformed,
/// whatever the payload.
#[test]
fn prop_unknown_op_code_is_malformed() {
    proptest!(|(op_code in 6u8.., payload in arb_payload())| {
        let result = decode(&RawMessage { op_code, payload });
        let is_malformed = matches!(result, Err(ProtocolError::MalformedMessage { .. }));
        prop_assert!(is_malformed);
    });
}

/// Property: decoding arbitrary payloads for known op codes returns a
/// message with that op code or an error, never anything else.
#[test]
fn prop_decode_keeps_op_code() {
    proptest!(|(op_code in 1u8..=5, payload in arb_payload())| {
        if let Ok(message) = decode(&RawMessage { op_code, payload }) {
            prop_assert_eq!(message.op_code().code(), op_code);
            prop_assert_eq!(OpCode::from_code(op_code), Some(message.op_code()));
        }
    });
}

/// Property: no input line makes the frame decoder panic.
#[test]
fn prop_garbled_lines_never_panic() {
    proptest!(|(line in ".{0,200}")| {
        let _ = decode_line(&line);
    });
}
