//! Session store: the registry of active game rooms.
//!
//! The store owns every [`Session`] together with the `connection → room`
//! affiliation map. Each session sits behind its own [`tokio::sync::Mutex`],
//! so everything that reads-then-mutates one room is serialized while
//! different rooms proceed independently. The registry itself is guarded by a
//! separate lock that is only held for lookups and insert/remove.
//!
//! Lock order is registry → session. No code path acquires the registry lock
//! while holding a session lock.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::board::{Board, Evaluation, Symbol};
use crate::error_codes::ErrorCode;
use crate::protocol::{ConnectionId, Role, RoomId};

/// A room never holds more than this many participants.
pub const MAX_PARTICIPANTS: usize = 2;

/// Default upper bound on room id length, in bytes.
pub const DEFAULT_MAX_ROOM_ID_LEN: usize = 64;

/// Shared handle to one session's lock.
pub type SessionHandle = Arc<Mutex<Session>>;

// ── Session ─────────────────────────────────────────────────────────

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// One participant is waiting for an opponent.
    Waiting,
    /// Both participants are present and moves are accepted.
    Active,
    /// The game ended; the board is frozen.
    Finished,
}

/// Final result of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    WinFor(Symbol),
    Draw,
}

impl Outcome {
    /// Maps a final [`Evaluation`]; `None` for [`Evaluation::Continue`].
    pub fn from_evaluation(evaluation: Evaluation) -> Option<Self> {
        match evaluation {
            Evaluation::Continue => None,
            Evaluation::Win(symbol) => Some(Outcome::WinFor(symbol)),
            Evaluation::Draw => Some(Outcome::Draw),
        }
    }
}

/// A connection taking part in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: ConnectionId,
    /// Display label, used as the chat sender label.
    pub label: String,
    /// Assigned once the second participant joins.
    pub symbol: Option<Symbol>,
}

/// A participant together with its assigned symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seat {
    pub connection_id: ConnectionId,
    pub symbol: Symbol,
}

/// The authoritative state of one room.
#[derive(Debug, Clone)]
pub struct Session {
    id: RoomId,
    participants: Vec<Participant>,
    board: Board,
    turn_owner: Option<ConnectionId>,
    status: SessionStatus,
    outcome: Option<Outcome>,
    /// Cleared when the session is removed from the store. A caller that
    /// obtained the handle before removal sees a closed session.
    open: bool,
}

impl Session {
    fn new(id: RoomId, first: Participant) -> Self {
        Self {
            id,
            participants: vec![first],
            board: Board::new(),
            turn_owner: None,
            status: SessionStatus::Waiting,
            outcome: None,
            open: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    pub fn symbol_of(&self, connection_id: ConnectionId) -> Option<Symbol> {
        self.participant(connection_id).and_then(|p| p.symbol)
    }

    /// The other participant, if present.
    pub fn opponent_of(&self, connection_id: ConnectionId) -> Option<ConnectionId> {
        self.participants
            .iter()
            .map(|p| p.connection_id)
            .find(|id| *id != connection_id)
    }

    /// Participants that hold a symbol, in join order.
    pub fn seats(&self) -> Vec<Seat> {
        self.participants
            .iter()
            .filter_map(|p| {
                p.symbol.map(|symbol| Seat {
                    connection_id: p.connection_id,
                    symbol,
                })
            })
            .collect()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn_owner(&self) -> Option<ConnectionId> {
        self.turn_owner
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// `false` once the session has been removed from the store.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Adds the second participant and starts the game: X for the first
    /// joiner, O for the second, X moves first.
    fn start(&mut self, second: Participant) -> SessionStart {
        self.participants.push(second);
        let mut seats = Vec::with_capacity(MAX_PARTICIPANTS);
        for (participant, symbol) in self.participants.iter_mut().zip([Symbol::X, Symbol::O]) {
            participant.symbol = Some(symbol);
            seats.push(Seat {
                connection_id: participant.connection_id,
                symbol,
            });
        }
        self.turn_owner = seats
            .iter()
            .find(|seat| seat.symbol == Symbol::X)
            .map(|seat| seat.connection_id);
        self.status = SessionStatus::Active;
        SessionStart {
            room_id: self.id.clone(),
            seats,
        }
    }

    /// Stores an accepted move. The caller has validated it.
    pub(crate) fn record_move(
        &mut self,
        board: Board,
        next_turn: ConnectionId,
        evaluation: Evaluation,
    ) {
        self.board = board;
        self.turn_owner = Some(next_turn);
        if let Some(outcome) = Outcome::from_evaluation(evaluation) {
            self.status = SessionStatus::Finished;
            self.outcome = Some(outcome);
        }
    }
}

// ── Store results ───────────────────────────────────────────────────

/// Data needed to notify both participants that a game started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub room_id: RoomId,
    pub seats: Vec<Seat>,
}

/// Successful result of [`SessionStore::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room_id: RoomId,
    pub role: Role,
    /// `None` for the first joiner until the opponent arrives.
    pub symbol: Option<Symbol>,
    /// Present when this join activated the session.
    pub start: Option<SessionStart>,
}

/// A participant left a session, destroying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    pub departed: ConnectionId,
    /// Participants that are still connected and must be told.
    pub remaining: Vec<ConnectionId>,
    /// Status at the moment of departure.
    pub status: SessionStatus,
}

/// Reasons a join request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room {room_id} is full, please choose another room to play")]
    RoomFull { room_id: RoomId },

    #[error("already in room {room_id}")]
    AlreadyInRoom { room_id: RoomId },

    #[error("invalid room id")]
    InvalidRoomId,
}

impl JoinError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            JoinError::RoomFull { .. } => ErrorCode::RoomFull,
            JoinError::AlreadyInRoom { .. } => ErrorCode::AlreadyInRoom,
            JoinError::InvalidRoomId => ErrorCode::InvalidRoomId,
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<RoomId, SessionHandle>,
    rooms_by_connection: HashMap<ConnectionId, RoomId>,
}

/// Process-wide registry of active sessions.
#[derive(Debug)]
pub struct SessionStore {
    registry: Mutex<Registry>,
    max_room_id_len: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_max_room_id_len(DEFAULT_MAX_ROOM_ID_LEN)
    }

    pub fn with_max_room_id_len(max_room_id_len: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            max_room_id_len,
        }
    }

    /// Joins `room_id`, creating the session on first use.
    ///
    /// The first joiner gets [`Role::First`] and no symbol yet. The second
    /// joiner activates the session and the returned [`JoinOutcome::start`]
    /// carries both seats. Surrounding whitespace in `room_id` is ignored.
    ///
    /// # Errors
    ///
    /// - [`JoinError::InvalidRoomId`] for a blank or overlong id.
    /// - [`JoinError::AlreadyInRoom`] if `connection_id` is already seated.
    /// - [`JoinError::RoomFull`] if two participants are present.
    pub async fn join(
        &self,
        room_id: &str,
        connection_id: ConnectionId,
        label: impl Into<String>,
    ) -> Result<JoinOutcome, JoinError> {
        self.join_then(room_id, connection_id, label, |_| {}).await
    }

    /// [`join`](Self::join), calling `notify` with the outcome before the
    /// registry and room locks are released. No move can be applied to the
    /// room until `notify` returns, so anything it queues is delivered ahead
    /// of the first move update.
    ///
    /// # Errors
    ///
    /// As [`join`](Self::join). `notify` is not called on error.
    pub async fn join_then<F>(
        &self,
        room_id: &str,
        connection_id: ConnectionId,
        label: impl Into<String>,
        notify: F,
    ) -> Result<JoinOutcome, JoinError>
    where
        F: FnOnce(&JoinOutcome),
    {
        let room_id = room_id.trim();
        if room_id.is_empty() || room_id.len() > self.max_room_id_len {
            return Err(JoinError::InvalidRoomId);
        }

        let mut registry = self.registry.lock().await;
        if let Some(current) = registry.rooms_by_connection.get(&connection_id) {
            return Err(JoinError::AlreadyInRoom {
                room_id: current.clone(),
            });
        }

        let participant = Participant {
            connection_id,
            label: label.into(),
            symbol: None,
        };

        let Some(handle) = registry.sessions.get(room_id).map(Arc::clone) else {
            let session = Session::new(room_id.to_string(), participant);
            registry
                .sessions
                .insert(room_id.to_string(), Arc::new(Mutex::new(session)));
            registry
                .rooms_by_connection
                .insert(connection_id, room_id.to_string());
            info!(room_id = %room_id, connection_id = %connection_id, "session created, waiting for opponent");
            let outcome = JoinOutcome {
                room_id: room_id.to_string(),
                role: Role::First,
                symbol: None,
                start: None,
            };
            notify(&outcome);
            return Ok(outcome);
        };

        let mut session = handle.lock().await;
        if session.participants.len() >= MAX_PARTICIPANTS {
            debug!(room_id = %room_id, connection_id = %connection_id, "join refused, room full");
            return Err(JoinError::RoomFull {
                room_id: room_id.to_string(),
            });
        }

        let start = session.start(participant);
        registry
            .rooms_by_connection
            .insert(connection_id, room_id.to_string());
        info!(room_id = %room_id, connection_id = %connection_id, "session active");

        let outcome = JoinOutcome {
            room_id: room_id.to_string(),
            role: Role::Second,
            symbol: Some(Symbol::O),
            start: Some(start),
        };
        notify(&outcome);
        Ok(outcome)
    }

    /// Returns the lock handle for `room_id`.
    pub async fn get(&self, room_id: &str) -> Option<SessionHandle> {
        self.registry.lock().await.sessions.get(room_id).cloned()
    }

    /// Returns a copy of the session's current state.
    pub async fn snapshot(&self, room_id: &str) -> Option<Session> {
        let handle = self.get(room_id).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Returns the room `connection_id` is seated in.
    pub async fn room_of(&self, connection_id: ConnectionId) -> Option<RoomId> {
        self.registry
            .lock()
            .await
            .rooms_by_connection
            .get(&connection_id)
            .cloned()
    }

    /// Removes `room_id` and every affiliation to it. Returns `false` if the
    /// room did not exist.
    pub async fn remove(&self, room_id: &str) -> bool {
        let handle = {
            let mut registry = self.registry.lock().await;
            let Some(handle) = registry.sessions.remove(room_id) else {
                return false;
            };
            registry
                .rooms_by_connection
                .retain(|_, room| room.as_str() != room_id);
            handle
        };
        handle.lock().await.open = false;
        debug!(room_id = %room_id, "session removed");
        true
    }

    /// Removes the session `connection_id` belongs to because that
    /// participant left or disconnected.
    ///
    /// Leaving while Waiting or Active abandons the game; leaving a Finished
    /// session acknowledges it. Either way the session is destroyed and the
    /// returned [`Departure`] lists who must be told. Returns `None` if the
    /// connection was not in a room.
    pub async fn depart(&self, connection_id: ConnectionId) -> Option<Departure> {
        let (room_id, handle) = {
            let mut registry = self.registry.lock().await;
            let room_id = registry.rooms_by_connection.remove(&connection_id)?;
            registry.rooms_by_connection.retain(|_, room| *room != room_id);
            let handle = registry.sessions.remove(&room_id)?;
            (room_id, handle)
        };

        let mut session = handle.lock().await;
        session.open = false;
        let remaining = session
            .participants
            .iter()
            .map(|p| p.connection_id)
            .filter(|id| *id != connection_id)
            .collect();

        info!(
            room_id = %room_id,
            connection_id = %connection_id,
            status = ?session.status,
            "participant departed, session destroyed"
        );

        Some(Departure {
            room_id,
            departed: connection_id,
            remaining,
            status: session.status,
        })
    }

    /// Number of active sessions.
    pub async fn len(&self) -> usize {
        self.registry.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
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
    use uuid::Uuid;

    fn conn(n: u128) -> ConnectionId {
        Uuid::from_u128(n)
    }

    #[tokio::test]
    async fn first_join_creates_waiting_session() {
        let store = SessionStore::new();
        let outcome = store.join("R1", conn(1), "Alice").await.unwrap();

        assert_eq!(outcome.role, Role::First);
        assert_eq!(outcome.symbol, None);
        assert!(outcome.start.is_none());

        let session = store.snapshot("R1").await.unwrap();
        assert_eq!(session.status(), SessionStatus::Waiting);
        assert_eq!(session.participants().len(), 1);
        assert_eq!(session.turn_owner(), None);
        assert_eq!(store.room_of(conn(1)).await.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn second_join_assigns_symbols_and_activates() {
        let store = SessionStore::new();
        store.join("R1", conn(1), "Alice").await.unwrap();
        let outcome = store.join("R1", conn(2), "Bob").await.unwrap();

        assert_eq!(outcome.role, Role::Second);
        assert_eq!(outcome.symbol, Some(Symbol::O));
        let start = outcome.start.unwrap();
        assert_eq!(
            start.seats,
            vec![
                Seat {
                    connection_id: conn(1),
                    symbol: Symbol::X
                },
                Seat {
                    connection_id: conn(2),
                    symbol: Symbol::O
                },
            ]
        );

        let session = store.snapshot("R1").await.unwrap();
        assert_eq!(session.status(), SessionStatus::Active);
        assert_eq!(session.turn_owner(), Some(conn(1)));
        assert_eq!(session.symbol_of(conn(1)), Some(Symbol::X));
        assert_eq!(session.symbol_of(conn(2)), Some(Symbol::O));
        assert_eq!(session.opponent_of(conn(1)), Some(conn(2)));
    }

    #[tokio::test]
    async fn join_notifies_while_room_is_locked() {
        let store = SessionStore::new();
        store.join("R1", conn(1), "Alice").await.unwrap();
        let handle = store.get("R1").await.unwrap();

        let mut room_locked = None;
        let mut registry_locked = None;
        let outcome = store
            .join_then("R1", conn(2), "Bob", |outcome| {
                assert!(outcome.start.is_some());
                room_locked = Some(handle.try_lock().is_err());
                registry_locked = Some(store.registry.try_lock().is_err());
            })
            .await
            .unwrap();

        assert_eq!(room_locked, Some(true));
        assert_eq!(registry_locked, Some(true));
        assert_eq!(outcome.role, Role::Second);
        assert!(handle.try_lock().is_ok());
    }

    #[tokio::test]
    async fn join_does_not_notify_on_error() {
        let store = SessionStore::new();
        store.join("R1", conn(1), "Alice").await.unwrap();
        let mut called = false;
        let err = store
            .join_then("R2", conn(1), "Alice", |_| called = true)
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::AlreadyInRoom { .. }));
        assert!(!called);
    }

    #[tokio::test]
    async fn third_join_is_room_full_and_state_untouched() {
        let store = SessionStore::new();
        store.join("R1", conn(1), "Alice").await.unwrap();
        store.join("R1", conn(2), "Bob").await.unwrap();
        let before = store.snapshot("R1").await.unwrap();

        let err = store.join("R1", conn(3), "Carol").await.unwrap_err();
        assert_eq!(
            err,
            JoinError::RoomFull {
                room_id: "R1".into()
            }
        );
        assert_eq!(err.error_code(), ErrorCode::RoomFull);

        let after = store.snapshot("R1").await.unwrap();
        assert_eq!(after.participants(), before.participants());
        assert_eq!(after.turn_owner(), before.turn_owner());
        assert_eq!(store.room_of(conn(3)).await, None);
    }

    #[tokio::test]
    async fn connection_cannot_sit_in_two_rooms() {
        let store = SessionStore::new();
        store.join("R1", conn(1), "Alice").await.unwrap();
        let err = store.join("R2", conn(1), "Alice").await.unwrap_err();
        assert_eq!(
            err,
            JoinError::AlreadyInRoom {
                room_id: "R1".into()
            }
        );
        assert!(store.get("R2").await.is_none());
    }

    #[tokio::test]
    async fn blank_and_overlong_room_ids_are_rejected() {
        let store = SessionStore::with_max_room_id_len(4);
        assert_eq!(
            store.join("   ", conn(1), "A").await.unwrap_err(),
            JoinError::InvalidRoomId
        );
        assert_eq!(
            store.join("ROOM5", conn(1), "A").await.unwrap_err(),
            JoinError::InvalidRoomId
        );
        assert!(store.join(" R1 ", conn(1), "A").await.is_ok());
        assert!(store.get("R1").await.is_some());
    }

    #[tokio::test]
    async fn depart_destroys_session_and_lists_remaining() {
        let store = SessionStore::new();
        store.join("R1", conn(1), "Alice").await.unwrap();
        store.join("R1", conn(2), "Bob").await.unwrap();
        let handle = store.get("R1").await.unwrap();

        let departure = store.depart(conn(1)).await.unwrap();
        assert_eq!(departure.room_id, "R1");
        assert_eq!(departure.remaining, vec![conn(2)]);
        assert_eq!(departure.status, SessionStatus::Active);

        assert!(store.is_empty().await);
        assert_eq!(store.room_of(conn(2)).await, None);
        assert!(!handle.lock().await.is_open());
        assert!(store.depart(conn(2)).await.is_none());
    }

    #[tokio::test]
    async fn room_id_is_reusable_after_removal() {
        let store = SessionStore::new();
        store.join("R1", conn(1), "Alice").await.unwrap();
        assert!(store.remove("R1").await);
        assert!(!store.remove("R1").await);
        assert_eq!(store.room_of(conn(1)).await, None);

        let outcome = store.join("R1", conn(1), "Alice").await.unwrap();
        assert_eq!(outcome.role, Role::First);
    }

    #[test]
    fn outcome_from_evaluation() {
        assert_eq!(Outcome::from_evaluation(Evaluation::Continue), None);
        assert_eq!(
            Outcome::from_evaluation(Evaluation::Win(Symbol::O)),
            Some(Outcome::WinFor(Symbol::O))
        );
        assert_eq!(
            Outcome::from_evaluation(Evaluation::Draw),
            Some(Outcome::Draw)
        );
    }
}
