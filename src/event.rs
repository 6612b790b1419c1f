//! Typed events delivered to game client consumers.

use crate::board::{Board, Symbol};
use crate::error_codes::ErrorCode;
use crate::protocol::{ConnectionId, GameResult, Role, RoomId, ServerMessage};

/// Events emitted by [`GameClient`](crate::client::GameClient) on its event channel.
///
/// Most variants mirror a [`ServerMessage`]; `Connected`, `ChatEchoed` and
/// `Disconnected` are produced by the client itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// The transport loop is running.
    Connected,
    RoomJoined {
        room_id: RoomId,
        connection_id: ConnectionId,
        role: Role,
    },
    RoomJoinFailed {
        reason: String,
        error_code: ErrorCode,
    },
    /// Both players are present.
    SessionStarted { symbol: Symbol, starts_first: bool },
    /// Authoritative board after an accepted move.
    BoardUpdated {
        board: Board,
        turn_owner: ConnectionId,
        /// `turn_owner` is this client.
        your_turn: bool,
    },
    MoveRejected {
        reason: String,
        error_code: ErrorCode,
    },
    GameEnded { result: GameResult, board: Board },
    ChatReceived { text: String, sender_label: String },
    /// Local echo of a chat line this client sent. The server never echoes.
    ChatEchoed { text: String },
    ChatRejected {
        reason: String,
        error_code: ErrorCode,
    },
    OpponentLeft,
    RoomLeft,
    Pong,
    Error {
        message: String,
        error_code: Option<ErrorCode>,
    },
    /// The transport loop exited. Always the last event.
    Disconnected { reason: Option<String> },
}

impl GameEvent {
    /// Converts a server message; `me` is this client's connection id, used
    /// to derive [`BoardUpdated::your_turn`](GameEvent::BoardUpdated).
    pub fn from_server(message: ServerMessage, me: Option<ConnectionId>) -> Self {
        match message {
            ServerMessage::RoomJoined {
                room_id,
                connection_id,
                role,
            } => GameEvent::RoomJoined {
                room_id,
                connection_id,
                role,
            },
            ServerMessage::RoomJoinError { reason, error_code } => {
                GameEvent::RoomJoinFailed { reason, error_code }
            }
            ServerMessage::SessionStarted {
                symbol,
                starts_first,
            } => GameEvent::SessionStarted {
                symbol,
                starts_first,
            },
            ServerMessage::MoveUpdate { board, turn_owner } => GameEvent::BoardUpdated {
                board,
                turn_owner,
                your_turn: me == Some(turn_owner),
            },
            ServerMessage::MoveRejected { reason, error_code } => {
                GameEvent::MoveRejected { reason, error_code }
            }
            ServerMessage::GameEnded { result, board } => GameEvent::GameEnded { result, board },
            ServerMessage::ChatReceived { text, sender_label } => {
                GameEvent::ChatReceived { text, sender_label }
            }
            ServerMessage::ChatRejected { reason, error_code } => {
                GameEvent::ChatRejected { reason, error_code }
            }
            ServerMessage::OpponentLeft => GameEvent::OpponentLeft,
            ServerMessage::RoomLeft => GameEvent::RoomLeft,
            ServerMessage::Pong => GameEvent::Pong,
            ServerMessage::Error {
                message,
                error_code,
            } => GameEvent::Error {
                message,
                error_code,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn board_update_marks_own_turn() {
        let me = Uuid::from_u128(5);
        let event = GameEvent::from_server(
            ServerMessage::MoveUpdate {
                board: Board::new(),
                turn_owner: me,
            },
            Some(me),
        );
        assert!(matches!(event, GameEvent::BoardUpdated { your_turn: true, .. }));

        let event = GameEvent::from_server(
            ServerMessage::MoveUpdate {
                board: Board::new(),
                turn_owner: me,
            },
            None,
        );
        assert!(matches!(event, GameEvent::BoardUpdated { your_turn: false, .. }));
    }

    #[test]
    fn join_error_maps_to_join_failed() {
        let event = GameEvent::from_server(
            ServerMessage::RoomJoinError {
                reason: "full".into(),
                error_code: ErrorCode::RoomFull,
            },
            None,
        );
        assert_eq!(
            event,
            GameEvent::RoomJoinFailed {
                reason: "full".into(),
                error_code: ErrorCode::RoomFull
            }
        );
    }
}
