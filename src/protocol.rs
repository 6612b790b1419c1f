//! Wire protocol types exchanged between game clients and the arbiter.
//!
//! Messages are JSON text, adjacently tagged as
//! `{"type": "<Variant>", "data": {...}}`; unit variants omit `data`.
//! The transport owns framing, so these types describe payload fields only.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{Board, Symbol};
use crate::error_codes::ErrorCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Identifier the arbiter assigns to each live connection.
pub type ConnectionId = Uuid;

/// Opaque room identifier chosen by the players.
pub type RoomId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Order in which a participant entered a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Created the room; will hold X.
    First,
    /// Completed the pair; will hold O.
    Second,
}

/// End-of-game result as seen by one recipient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Won,
    Lost,
    Draw,
}

impl GameResult {
    /// Text shown to the player when the game ends.
    pub fn message(self) -> &'static str {
        match self {
            GameResult::Won => "You Won!",
            GameResult::Lost => "You Lost!",
            GameResult::Draw => "The Game is a TIE!",
        }
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Join the room with this id, creating it if nobody is waiting there.
    JoinRoom {
        room_id: RoomId,
        /// Label shown to the opponent next to chat messages.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
    },
    /// Place this player's mark at `(row, col)`.
    SubmitMove { row: usize, col: usize },
    /// Send a chat line to the other participant.
    SendChat { text: String },
    /// Leave the current room. Acknowledges a finished game.
    LeaveRoom,
    /// Heartbeat.
    Ping,
}

/// Message types sent from arbiter to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// The join request succeeded.
    RoomJoined {
        room_id: RoomId,
        /// The id the arbiter uses for this connection; compare against
        /// `turn_owner` in [`MoveUpdate`](ServerMessage::MoveUpdate).
        connection_id: ConnectionId,
        role: Role,
    },
    /// The join request failed.
    RoomJoinError { reason: String, error_code: ErrorCode },
    /// Both players are present; sent to each player individually.
    SessionStarted { symbol: Symbol, starts_first: bool },
    /// Authoritative board after an accepted move, sent to the whole room.
    MoveUpdate {
        board: Board,
        turn_owner: ConnectionId,
    },
    /// The submitted move was refused. Sent to the mover only.
    MoveRejected { reason: String, error_code: ErrorCode },
    /// The game is over; `result` is specific to the recipient.
    GameEnded { result: GameResult, board: Board },
    /// Chat line from the other participant.
    ChatReceived { text: String, sender_label: String },
    /// The chat line was refused. Sent to the sender only.
    ChatRejected { reason: String, error_code: ErrorCode },
    /// The other participant left or disconnected; the room is gone.
    OpponentLeft,
    /// Confirms a [`LeaveRoom`](ClientMessage::LeaveRoom).
    RoomLeft,
    /// Heartbeat reply.
    Pong,
    /// Generic error not tied to a specific request type.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
}
