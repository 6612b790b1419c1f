//! Error codes for structured rejection handling in the game protocol.
//!
//! Codes serialize using `SCREAMING_SNAKE_CASE` (e.g. `"ROOM_FULL"`) so that
//! non-Rust clients can match on them without parsing the free-form reason.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes sent by the arbiter alongside every rejection.
///
/// Use [`description()`](ErrorCode::description) for a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Room errors
    RoomFull,
    NoSuchRoom,
    AlreadyInRoom,
    NotInRoom,
    InvalidRoomId,

    // Move errors
    NotActive,
    NotYourTurn,
    CellOccupied,
    OutOfBounds,

    // Chat errors
    EmptyMessage,
    MessageTooLong,

    // Protocol errors
    InvalidMessage,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            // Room errors
            Self::RoomFull => {
                "The room already has two players. Choose another room to play."
            }
            Self::NoSuchRoom => {
                "The room does not exist. It may have ended or your opponent may have left."
            }
            Self::AlreadyInRoom => {
                "You are already in a room. Leave the current room before joining another."
            }
            Self::NotInRoom => "You are not in a room. Join a room before performing this action.",
            Self::InvalidRoomId => {
                "The room id is invalid. Room ids must be non-empty and not excessively long."
            }

            // Move errors
            Self::NotActive => {
                "The game is not in progress. Wait for an opponent or start a new game."
            }
            Self::NotYourTurn => "It is not your turn. Wait for your opponent to move.",
            Self::CellOccupied => "That cell is already taken. Pick an empty cell.",
            Self::OutOfBounds => "That cell is outside the 3x3 board.",

            // Chat errors
            Self::EmptyMessage => "Chat messages must contain some text.",
            Self::MessageTooLong => "The chat message exceeds the maximum allowed length.",

            // Protocol errors
            Self::InvalidMessage => {
                "The message could not be understood. Check the message format."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::NotYourTurn).unwrap();
        assert_eq!(json, "\"NOT_YOUR_TURN\"");
        let code: ErrorCode = serde_json::from_str("\"ROOM_FULL\"").unwrap();
        assert_eq!(code, ErrorCode::RoomFull);
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(serde_json::from_str::<ErrorCode>("\"INTERNAL_ERROR\"").is_err());
        assert!(serde_json::from_str::<ErrorCode>("\"room_full\"").is_err());
    }

    #[test]
    fn display_uses_description() {
        assert_eq!(
            ErrorCode::CellOccupied.to_string(),
            ErrorCode::CellOccupied.description()
        );
    }
}
