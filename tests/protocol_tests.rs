#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire format fixtures.
//!
//! Each test pins the exact JSON a message produces or accepts, so a change
//! to the serde attributes shows up as a fixture diff rather than as a
//! silent protocol break.

use serde_json::json;
use tictactoe_arbiter::board::{Board, Symbol};
use tictactoe_arbiter::error_codes::ErrorCode;
use tictactoe_arbiter::protocol::{ClientMessage, GameResult, Role, ServerMessage};
use uuid::Uuid;

fn to_value<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).expect("serialize")
}

// ════════════════════════════════════════════════════════════════════
// Client → server
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_room_fixture() {
    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "JoinRoom",
        "data": { "room_id": "R1", "player_name": "Alice" }
    }))
    .unwrap();
    assert_eq!(
        msg,
        ClientMessage::JoinRoom {
            room_id: "R1".into(),
            player_name: Some("Alice".into())
        }
    );

    // player_name is omitted, not null, when absent.
    assert_eq!(
        to_value(&ClientMessage::JoinRoom {
            room_id: "R1".into(),
            player_name: None
        }),
        json!({ "type": "JoinRoom", "data": { "room_id": "R1" } })
    );
}

#[test]
fn submit_move_fixture() {
    assert_eq!(
        to_value(&ClientMessage::SubmitMove { row: 2, col: 0 }),
        json!({ "type": "SubmitMove", "data": { "row": 2, "col": 0 } })
    );
}

#[test]
fn negative_coordinates_are_malformed() {
    let result = serde_json::from_value::<ClientMessage>(json!({
        "type": "SubmitMove",
        "data": { "row": -1, "col": 0 }
    }));
    assert!(result.is_err());
}

#[test]
fn chat_and_unit_fixtures() {
    assert_eq!(
        to_value(&ClientMessage::SendChat { text: "hi".into() }),
        json!({ "type": "SendChat", "data": { "text": "hi" } })
    );
    assert_eq!(
        to_value(&ClientMessage::LeaveRoom),
        json!({ "type": "LeaveRoom" })
    );
    assert_eq!(to_value(&ClientMessage::Ping), json!({ "type": "Ping" }));
}

#[test]
fn unknown_type_is_rejected() {
    let result = serde_json::from_str::<ClientMessage>(r#"{"type":"Resign"}"#);
    assert!(result.is_err());
}

// ════════════════════════════════════════════════════════════════════
// Server → client
// ════════════════════════════════════════════════════════════════════

#[test]
fn room_joined_fixture() {
    let id = Uuid::from_u128(1);
    assert_eq!(
        to_value(&ServerMessage::RoomJoined {
            room_id: "R1".into(),
            connection_id: id,
            role: Role::Second,
        }),
        json!({
            "type": "RoomJoined",
            "data": {
                "room_id": "R1",
                "connection_id": "00000000-0000-0000-0000-000000000001",
                "role": "second"
            }
        })
    );
}

#[test]
fn move_update_fixture() {
    let board = Board::new()
        .place(0, 0, Symbol::X)
        .unwrap()
        .place(1, 1, Symbol::O)
        .unwrap();
    assert_eq!(
        to_value(&ServerMessage::MoveUpdate {
            board,
            turn_owner: Uuid::nil(),
        }),
        json!({
            "type": "MoveUpdate",
            "data": {
                "board": [["X", null, null], [null, "O", null], [null, null, null]],
                "turn_owner": "00000000-0000-0000-0000-000000000000"
            }
        })
    );
}

#[test]
fn board_rejects_wrong_shape() {
    let result = serde_json::from_value::<Board>(json!([["X", null], [null, null, null]]));
    assert!(result.is_err());
    let result = serde_json::from_value::<Board>(json!([["Z", null, null], [], []]));
    assert!(result.is_err());
}

#[test]
fn rejection_fixtures_use_screaming_codes() {
    assert_eq!(
        to_value(&ServerMessage::MoveRejected {
            reason: "cell (0, 0) is already occupied".into(),
            error_code: ErrorCode::CellOccupied,
        }),
        json!({
            "type": "MoveRejected",
            "data": {
                "reason": "cell (0, 0) is already occupied",
                "error_code": "CELL_OCCUPIED"
            }
        })
    );
    assert_eq!(
        to_value(&ServerMessage::RoomJoinError {
            reason: "full".into(),
            error_code: ErrorCode::RoomFull,
        })["data"]["error_code"],
        json!("ROOM_FULL")
    );
}

#[test]
fn every_error_code_has_wire_name_and_description() {
    let codes = [
        (ErrorCode::RoomFull, "ROOM_FULL"),
        (ErrorCode::NoSuchRoom, "NO_SUCH_ROOM"),
        (ErrorCode::AlreadyInRoom, "ALREADY_IN_ROOM"),
        (ErrorCode::NotInRoom, "NOT_IN_ROOM"),
        (ErrorCode::InvalidRoomId, "INVALID_ROOM_ID"),
        (ErrorCode::NotActive, "NOT_ACTIVE"),
        (ErrorCode::NotYourTurn, "NOT_YOUR_TURN"),
        (ErrorCode::CellOccupied, "CELL_OCCUPIED"),
        (ErrorCode::OutOfBounds, "OUT_OF_BOUNDS"),
        (ErrorCode::EmptyMessage, "EMPTY_MESSAGE"),
        (ErrorCode::MessageTooLong, "MESSAGE_TOO_LONG"),
        (ErrorCode::InvalidMessage, "INVALID_MESSAGE"),
    ];
    for (code, wire) in codes {
        assert_eq!(to_value(&code), json!(wire));
        assert!(!code.description().is_empty());
    }
}

#[test]
fn session_started_and_game_ended_fixtures() {
    assert_eq!(
        to_value(&ServerMessage::SessionStarted {
            symbol: Symbol::X,
            starts_first: true,
        }),
        json!({ "type": "SessionStarted", "data": { "symbol": "X", "starts_first": true } })
    );

    let msg: ServerMessage = serde_json::from_value(json!({
        "type": "GameEnded",
        "data": {
            "result": "draw",
            "board": [["X", "O", "X"], ["X", "O", "O"], ["O", "X", "X"]]
        }
    }))
    .unwrap();
    match msg {
        ServerMessage::GameEnded { result, board } => {
            assert_eq!(result, GameResult::Draw);
            assert!(board.is_full());
        }
        other => panic!("expected GameEnded, got {other:?}"),
    }
}

#[test]
fn error_without_code_omits_field() {
    assert_eq!(
        to_value(&ServerMessage::Error {
            message: "boom".into(),
            error_code: None,
        }),
        json!({ "type": "Error", "data": { "message": "boom" } })
    );
    let msg: ServerMessage =
        serde_json::from_str(r#"{"type":"Error","data":{"message":"boom"}}"#).unwrap();
    assert_eq!(
        msg,
        ServerMessage::Error {
            message: "boom".into(),
            error_code: None
        }
    );
}

#[test]
fn unit_server_messages() {
    for (msg, tag) in [
        (ServerMessage::OpponentLeft, "OpponentLeft"),
        (ServerMessage::RoomLeft, "RoomLeft"),
        (ServerMessage::Pong, "Pong"),
    ] {
        assert_eq!(to_value(&msg), json!({ "type": tag }));
    }
}
