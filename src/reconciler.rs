//! Client-side cache of the authoritative game state.
//!
//! The [`Reconciler`] never decides anything: it mirrors the last state the
//! arbiter broadcast, lets the local player make an optimistic move, and is
//! overwritten wholesale by the next authoritative update.
//!
//! Two boards are kept. `board` is what the player sees, including a pending
//! optimistic mark. `confirmed` is the last board the server sent. A
//! [`MoveRejected`](ServerMessage::MoveRejected) is never followed by a
//! broadcast (the server state did not change), so on rejection the view is
//! rolled back to `confirmed` and the turn is handed back.

use thiserror::Error;
use tracing::debug;

use crate::board::{Board, PlaceError, Symbol};
use crate::protocol::{ClientMessage, ConnectionId, GameResult, RoomId, ServerMessage};

/// Reasons a move is refused locally, without a network round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocalMoveError {
    #[error("the game has not started")]
    NotStarted,

    #[error("the game is over")]
    GameOver,

    #[error("not your turn")]
    NotYourTurn,

    #[error("cell ({row}, {col}) is outside the board")]
    OutOfBounds { row: usize, col: usize },

    #[error("cell ({row}, {col}) is already occupied")]
    CellOccupied { row: usize, col: usize },
}

impl From<PlaceError> for LocalMoveError {
    fn from(err: PlaceError) -> Self {
        match err {
            PlaceError::CellOccupied { row, col } => LocalMoveError::CellOccupied { row, col },
            PlaceError::OutOfBounds { row, col } => LocalMoveError::OutOfBounds { row, col },
        }
    }
}

/// Local mirror of one client's game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciler {
    connection_id: Option<ConnectionId>,
    room_id: Option<RoomId>,
    symbol: Option<Symbol>,
    board: Board,
    is_my_turn: bool,
    confirmed: Board,
    confirmed_turn: bool,
    result: Option<GameResult>,
    opponent_left: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn symbol(&self) -> Option<Symbol> {
        self.symbol
    }

    /// The board as the player should see it.
    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn is_my_turn(&self) -> bool {
        self.is_my_turn
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn opponent_left(&self) -> bool {
        self.opponent_left
    }

    /// `true` once the game ended or the opponent left.
    pub fn is_frozen(&self) -> bool {
        self.result.is_some() || self.opponent_left
    }

    /// Applies a move optimistically and returns the message to forward.
    ///
    /// # Errors
    ///
    /// Returns a [`LocalMoveError`] without changing anything when the move
    /// cannot possibly be accepted.
    pub fn try_move(&mut self, row: usize, col: usize) -> Result<ClientMessage, LocalMoveError> {
        if self.is_frozen() {
            return Err(LocalMoveError::GameOver);
        }
        let symbol = self.symbol.ok_or(LocalMoveError::NotStarted)?;
        if !self.is_my_turn {
            return Err(LocalMoveError::NotYourTurn);
        }

        self.board = self.board.place(row, col, symbol)?;
        self.is_my_turn = false;
        Ok(ClientMessage::SubmitMove { row, col })
    }

    /// Drops an optimistic mark and hands the turn back, as if the server had
    /// rejected it.
    pub fn discard_pending(&mut self) {
        self.board = self.confirmed;
        self.is_my_turn = self.confirmed_turn && !self.is_frozen();
    }

    /// Folds one server message into the local state.
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::RoomJoined {
                room_id,
                connection_id,
                ..
            } => {
                *self = Self {
                    connection_id: Some(*connection_id),
                    room_id: Some(room_id.clone()),
                    ..Self::default()
                };
            }
            ServerMessage::SessionStarted {
                symbol,
                starts_first,
            } => {
                self.symbol = Some(*symbol);
                self.confirm(Board::new(), *starts_first);
            }
            ServerMessage::MoveUpdate { board, turn_owner } => {
                let mine = self.connection_id == Some(*turn_owner);
                self.confirm(*board, mine);
            }
            ServerMessage::MoveRejected { error_code, .. } => {
                debug!(?error_code, "move rejected, restoring confirmed board");
                self.discard_pending();
            }
            ServerMessage::GameEnded { result, board } => {
                self.confirm(*board, false);
                self.result = Some(*result);
            }
            ServerMessage::OpponentLeft => {
                self.opponent_left = true;
                self.is_my_turn = false;
            }
            ServerMessage::RoomLeft => {
                *self = Self {
                    connection_id: self.connection_id,
                    ..Self::default()
                };
            }
            _ => {}
        }
    }

    fn confirm(&mut self, board: Board, my_turn: bool) {
        self.confirmed = board;
        self.confirmed_turn = my_turn;
        self.board = board;
        self.is_my_turn = my_turn;
    }
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
    use crate::error_codes::ErrorCode;
    use crate::protocol::Role;
    use uuid::Uuid;

    const ME: Uuid = Uuid::from_u128(1);
    const PEER: Uuid = Uuid::from_u128(2);

    fn started(symbol: Symbol) -> Reconciler {
        let mut r = Reconciler::new();
        r.apply(&ServerMessage::RoomJoined {
            room_id: "R1".into(),
            connection_id: ME,
            role: Role::First,
        });
        r.apply(&ServerMessage::SessionStarted {
            symbol,
            starts_first: symbol == Symbol::X,
        });
        r
    }

    #[test]
    fn move_before_start_is_refused() {
        let mut r = Reconciler::new();
        assert_eq!(r.try_move(0, 0), Err(LocalMoveError::NotStarted));
    }

    #[test]
    fn optimistic_move_applies_and_yields_turn() {
        let mut r = started(Symbol::X);
        assert!(r.is_my_turn());

        let msg = r.try_move(1, 1).unwrap();
        assert_eq!(msg, ClientMessage::SubmitMove { row: 1, col: 1 });
        assert_eq!(r.board().cell(1, 1), Some(Cell::Taken(Symbol::X)));
        assert!(!r.is_my_turn());

        assert_eq!(r.try_move(0, 0), Err(LocalMoveError::NotYourTurn));
    }

    #[test]
    fn occupied_cell_is_refused_locally() {
        let mut r = started(Symbol::O);
        let board = Board::new().place(0, 0, Symbol::X).unwrap();
        r.apply(&ServerMessage::MoveUpdate {
            board,
            turn_owner: ME,
        });
        assert_eq!(
            r.try_move(0, 0),
            Err(LocalMoveError::CellOccupied { row: 0, col: 0 })
        );
        assert!(r.is_my_turn());
        assert_eq!(r.board(), &board);
    }

    #[test]
    fn move_update_overwrites_local_board() {
        let mut r = started(Symbol::X);
        r.try_move(0, 0).unwrap();

        // Authoritative board disagrees with the optimistic one.
        let authoritative = Board::new()
            .place(2, 2, Symbol::X)
            .unwrap()
            .place(1, 1, Symbol::O)
            .unwrap();
        r.apply(&ServerMessage::MoveUpdate {
            board: authoritative,
            turn_owner: ME,
        });
        assert_eq!(r.board(), &authoritative);
        assert!(r.is_my_turn());
    }

    #[test]
    fn peer_turn_owner_means_not_my_turn() {
        let mut r = started(Symbol::X);
        r.try_move(0, 0).unwrap();
        r.apply(&ServerMessage::MoveUpdate {
            board: Board::new().place(0, 0, Symbol::X).unwrap(),
            turn_owner: PEER,
        });
        assert!(!r.is_my_turn());
    }

    #[test]
    fn rejection_rolls_back_to_confirmed() {
        let mut r = started(Symbol::X);
        r.try_move(2, 0).unwrap();
        r.apply(&ServerMessage::MoveRejected {
            reason: "cell occupied".into(),
            error_code: ErrorCode::CellOccupied,
        });
        assert_eq!(r.board(), &Board::new());
        assert!(r.is_my_turn());
    }

    #[test]
    fn discard_pending_keeps_confirmed_marks() {
        let mut r = started(Symbol::O);
        let board = Board::new().place(0, 0, Symbol::X).unwrap();
        r.apply(&ServerMessage::MoveUpdate {
            board,
            turn_owner: ME,
        });
        r.try_move(1, 1).unwrap();
        r.discard_pending();
        assert_eq!(r.board(), &board);
        assert!(r.is_my_turn());
    }

    #[test]
    fn game_end_freezes() {
        let mut r = started(Symbol::O);
        let board = Board::new().place(0, 0, Symbol::X).unwrap();
        r.apply(&ServerMessage::GameEnded {
            result: GameResult::Lost,
            board,
        });
        assert_eq!(r.result(), Some(GameResult::Lost));
        assert!(r.is_frozen());
        assert_eq!(r.board(), &board);
        assert_eq!(r.try_move(1, 1), Err(LocalMoveError::GameOver));
    }

    #[test]
    fn opponent_left_freezes() {
        let mut r = started(Symbol::X);
        r.apply(&ServerMessage::OpponentLeft);
        assert!(r.opponent_left());
        assert_eq!(r.try_move(0, 0), Err(LocalMoveError::GameOver));
    }

    #[test]
    fn room_left_resets_but_keeps_identity() {
        let mut r = started(Symbol::X);
        r.apply(&ServerMessage::RoomLeft);
        assert_eq!(r.connection_id(), Some(ME));
        assert_eq!(r.room_id(), None);
        assert_eq!(r.symbol(), None);
        assert!(!r.is_frozen());
    }
}
