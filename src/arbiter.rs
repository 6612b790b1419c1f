//! Turn arbitration: validate a move against its session, apply it, and
//! compute the outcome.
//!
//! Validation runs in a fixed order and stops at the first failure:
//!
//! 1. the room exists ([`MoveRejection::NoSuchRoom`])
//! 2. the session is active ([`MoveRejection::NotActive`])
//! 3. the mover owns the turn ([`MoveRejection::NotYourTurn`])
//! 4. the coordinates are on the board ([`MoveRejection::OutOfBounds`])
//! 5. the cell is empty ([`MoveRejection::CellOccupied`])
//!
//! A rejected move never touches the session.

use thiserror::Error;
use tracing::{debug, info};

use crate::board::{Board, Evaluation, PlaceError, Symbol};
use crate::error_codes::ErrorCode;
use crate::protocol::{ConnectionId, RoomId};
use crate::session::{Seat, Session, SessionStatus, SessionStore};

/// Reasons a move is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("no such room")]
    NoSuchRoom,

    #[error("game is not active ({status:?})")]
    NotActive { status: SessionStatus },

    #[error("not your turn")]
    NotYourTurn,

    #[error("cell ({row}, {col}) is outside the board")]
    OutOfBounds { row: usize, col: usize },

    #[error("cell ({row}, {col}) is already occupied")]
    CellOccupied { row: usize, col: usize },
}

impl MoveRejection {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            MoveRejection::NoSuchRoom => ErrorCode::NoSuchRoom,
            MoveRejection::NotActive { .. } => ErrorCode::NotActive,
            MoveRejection::NotYourTurn => ErrorCode::NotYourTurn,
            MoveRejection::OutOfBounds { .. } => ErrorCode::OutOfBounds,
            MoveRejection::CellOccupied { .. } => ErrorCode::CellOccupied,
        }
    }
}

impl From<PlaceError> for MoveRejection {
    fn from(err: PlaceError) -> Self {
        match err {
            PlaceError::CellOccupied { row, col } => MoveRejection::CellOccupied { row, col },
            PlaceError::OutOfBounds { row, col } => MoveRejection::OutOfBounds { row, col },
        }
    }
}

/// An applied move and everything the router needs to announce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedMove {
    pub room_id: RoomId,
    pub mover: ConnectionId,
    pub symbol: Symbol,
    pub row: usize,
    pub col: usize,
    /// Board after the move.
    pub board: Board,
    /// Participant whose move is accepted next.
    pub turn_owner: ConnectionId,
    pub evaluation: Evaluation,
    pub seats: Vec<Seat>,
}

impl AcceptedMove {
    /// `true` if this move won or drew the game.
    pub fn is_final(&self) -> bool {
        self.evaluation.is_final()
    }
}

/// Looks up `room_id` and arbitrates the move under that session's lock.
///
/// # Errors
///
/// Returns the first failed check as a [`MoveRejection`].
pub async fn submit_move(
    store: &SessionStore,
    room_id: &str,
    connection_id: ConnectionId,
    row: usize,
    col: usize,
) -> Result<AcceptedMove, MoveRejection> {
    let handle = store.get(room_id).await.ok_or(MoveRejection::NoSuchRoom)?;
    let mut session = handle.lock().await;
    arbitrate(&mut session, connection_id, row, col)
}

/// Validates and applies one move to a locked session.
///
/// # Errors
///
/// Returns the first failed check as a [`MoveRejection`]; `session` is left
/// unchanged in that case.
pub fn arbitrate(
    session: &mut Session,
    connection_id: ConnectionId,
    row: usize,
    col: usize,
) -> Result<AcceptedMove, MoveRejection> {
    if !session.is_open() {
        return Err(MoveRejection::NoSuchRoom);
    }
    if session.status() != SessionStatus::Active {
        return Err(MoveRejection::NotActive {
            status: session.status(),
        });
    }
    if session.turn_owner() != Some(connection_id) {
        debug!(room_id = %session.id(), connection_id = %connection_id, "move out of turn");
        return Err(MoveRejection::NotYourTurn);
    }
    let (Some(symbol), Some(next_turn)) = (
        session.symbol_of(connection_id),
        session.opponent_of(connection_id),
    ) else {
        return Err(MoveRejection::NotYourTurn);
    };

    let board = session.board().place(row, col, symbol)?;
    let evaluation = board.evaluate();
    session.record_move(board, next_turn, evaluation);

    if evaluation.is_final() {
        info!(room_id = %session.id(), outcome = ?evaluation, "game finished");
    } else {
        debug!(room_id = %session.id(), symbol = %symbol, row, col, "move accepted");
    }

    Ok(AcceptedMove {
        room_id: session.id().to_string(),
        mover: connection_id,
        symbol,
        row,
        col,
        board,
        turn_owner: next_turn,
        evaluation,
        seats: session.seats(),
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::board::Cell;
    use crate::session::Outcome;
    use uuid::Uuid;

    const A: Uuid = Uuid::from_u128(1);
    const B: Uuid = Uuid::from_u128(2);

    async fn active_store() -> SessionStore {
        let store = SessionStore::new();
        store.join("R1", A, "A").await.unwrap();
        store.join("R1", B, "B").await.unwrap();
        store
    }

    #[tokio::test]
    async fn accepted_move_flips_turn() {
        let store = active_store().await;
        let accepted = submit_move(&store, "R1", A, 0, 0).await.unwrap();

        assert_eq!(accepted.symbol, Symbol::X);
        assert_eq!(accepted.turn_owner, B);
        assert_eq!(accepted.evaluation, Evaluation::Continue);
        assert!(!accepted.is_final());
        assert_eq!(accepted.board.cell(0, 0), Some(Cell::Taken(Symbol::X)));

        let session = store.snapshot("R1").await.unwrap();
        assert_eq!(session.turn_owner(), Some(B));
        assert_eq!(session.board(), &accepted.board);
    }

    #[tokio::test]
    async fn unknown_room_is_rejected() {
        let store = active_store().await;
        let err = submit_move(&store, "nope", A, 0, 0).await.unwrap_err();
        assert_eq!(err, MoveRejection::NoSuchRoom);
        assert_eq!(err.error_code(), ErrorCode::NoSuchRoom);
    }

    #[tokio::test]
    async fn waiting_session_is_not_active() {
        let store = SessionStore::new();
        store.join("R1", A, "A").await.unwrap();
        let err = submit_move(&store, "R1", A, 0, 0).await.unwrap_err();
        assert_eq!(
            err,
            MoveRejection::NotActive {
                status: SessionStatus::Waiting
            }
        );
    }

    #[tokio::test]
    async fn rejections_leave_state_unchanged() {
        let store = active_store().await;
        submit_move(&store, "R1", A, 0, 0).await.unwrap();
        let before = store.snapshot("R1").await.unwrap();

        let err = submit_move(&store, "R1", A, 1, 1).await.unwrap_err();
        assert_eq!(err, MoveRejection::NotYourTurn);

        let err = submit_move(&store, "R1", B, 0, 0).await.unwrap_err();
        assert_eq!(err, MoveRejection::CellOccupied { row: 0, col: 0 });

        let err = submit_move(&store, "R1", B, 0, 3).await.unwrap_err();
        assert_eq!(err, MoveRejection::OutOfBounds { row: 0, col: 3 });

        let after = store.snapshot("R1").await.unwrap();
        assert_eq!(after.board(), before.board());
        assert_eq!(after.turn_owner(), before.turn_owner());
    }

    #[tokio::test]
    async fn stranger_cannot_move() {
        let store = active_store().await;
        let stranger = Uuid::from_u128(99);
        let err = submit_move(&store, "R1", stranger, 0, 0).await.unwrap_err();
        assert_eq!(err, MoveRejection::NotYourTurn);
    }

    #[tokio::test]
    async fn turn_check_precedes_cell_check() {
        let store = active_store().await;
        submit_move(&store, "R1", A, 0, 0).await.unwrap();
        // A targets its own occupied cell out of turn: NotYourTurn wins.
        let err = submit_move(&store, "R1", A, 0, 0).await.unwrap_err();
        assert_eq!(err, MoveRejection::NotYourTurn);
    }

    #[tokio::test]
    async fn winning_move_finishes_session() {
        let store = active_store().await;
        for (who, row, col) in [(A, 0, 0), (B, 1, 0), (A, 0, 1), (B, 1, 1)] {
            submit_move(&store, "R1", who, row, col).await.unwrap();
        }
        let accepted = submit_move(&store, "R1", A, 0, 2).await.unwrap();
        assert_eq!(accepted.evaluation, Evaluation::Win(Symbol::X));
        assert!(accepted.is_final());

        let session = store.snapshot("R1").await.unwrap();
        assert_eq!(session.status(), SessionStatus::Finished);
        assert_eq!(session.outcome(), Some(Outcome::WinFor(Symbol::X)));

        let err = submit_move(&store, "R1", B, 2, 2).await.unwrap_err();
        assert_eq!(
            err,
            MoveRejection::NotActive {
                status: SessionStatus::Finished
            }
        );
        let frozen = store.snapshot("R1").await.unwrap();
        assert_eq!(frozen.board(), session.board());
        assert_eq!(frozen.turn_owner(), session.turn_owner());
    }

    #[tokio::test]
    async fn closed_handle_reports_no_such_room() {
        let store = active_store().await;
        let handle = store.get("R1").await.unwrap();
        store.remove("R1").await;
        let mut session = handle.lock().await;
        let err = arbitrate(&mut session, A, 0, 0).unwrap_err();
        assert_eq!(err, MoveRejection::NoSuchRoom);
    }
}
