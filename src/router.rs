//! Room broadcast routing: who receives which message.
//!
//! Audience rules:
//!
//! | Event                  | Audience                                   |
//! |------------------------|--------------------------------------------|
//! | session start          | each participant, with its own symbol      |
//! | non-final move         | every participant, same [`MoveUpdate`]     |
//! | final move             | every participant, per-recipient result    |
//! | chat                   | every participant except the sender        |
//! | departure              | the remaining participant                  |
//! | replies and rejections | the requester only                         |
//!
//! The `plan_*` functions are pure and return [`Delivery`] lists; a
//! [`RoomRouter`] hands them to an [`Outbox`]. [`ConnectionHub`] is the
//! in-process outbox backed by one unbounded channel per connection.
//!
//! [`MoveUpdate`]: ServerMessage::MoveUpdate

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::arbiter::AcceptedMove;
use crate::board::{Evaluation, Symbol};
use crate::error::{ArbiterError, Result};
use crate::error_codes::ErrorCode;
use crate::protocol::{ConnectionId, GameResult, RoomId, ServerMessage};
use crate::session::{Departure, SessionStart};

/// Default upper bound on chat text length, in characters.
pub const DEFAULT_MAX_CHAT_LEN: usize = 500;

// ── Chat ────────────────────────────────────────────────────────────

/// A chat line on its way to the other participant. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub room_id: RoomId,
    pub sender_label: String,
    pub sender_connection_id: ConnectionId,
    pub text: String,
}

/// Reasons a chat line is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("message is empty")]
    Empty,

    #[error("message longer than {max} characters")]
    TooLong { max: usize },

    #[error("not in a room")]
    NotInRoom,
}

impl ChatError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ChatError::Empty => ErrorCode::EmptyMessage,
            ChatError::TooLong { .. } => ErrorCode::MessageTooLong,
            ChatError::NotInRoom => ErrorCode::NotInRoom,
        }
    }
}

/// Checks a chat line. Whitespace-only text counts as empty; the text itself
/// is forwarded unchanged.
///
/// # Errors
///
/// [`ChatError::Empty`] or [`ChatError::TooLong`].
pub fn validate_chat(text: &str, max_len: usize) -> std::result::Result<(), ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::Empty);
    }
    if text.chars().count() > max_len {
        return Err(ChatError::TooLong { max: max_len });
    }
    Ok(())
}

// ── Planning ────────────────────────────────────────────────────────

/// One message addressed to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

impl Delivery {
    pub fn new(to: ConnectionId, message: ServerMessage) -> Self {
        Self { to, message }
    }
}

/// The result a holder of `symbol` sees for a final evaluation.
pub fn result_for(symbol: Symbol, evaluation: Evaluation) -> Option<GameResult> {
    match evaluation {
        Evaluation::Continue => None,
        Evaluation::Draw => Some(GameResult::Draw),
        Evaluation::Win(winner) if winner == symbol => Some(GameResult::Won),
        Evaluation::Win(_) => Some(GameResult::Lost),
    }
}

/// Individual start notifications: each seat learns its symbol and whether it
/// moves first.
pub fn plan_session_start(start: &SessionStart) -> Vec<Delivery> {
    start
        .seats
        .iter()
        .map(|seat| {
            Delivery::new(
                seat.connection_id,
                ServerMessage::SessionStarted {
                    symbol: seat.symbol,
                    starts_first: seat.symbol == Symbol::X,
                },
            )
        })
        .collect()
}

/// Broadcast for an accepted move.
///
/// A non-final move sends the same board and turn owner to everybody. A
/// final move skips the board broadcast and sends each participant its own
/// [`GameEnded`](ServerMessage::GameEnded) result instead.
pub fn plan_move(accepted: &AcceptedMove) -> Vec<Delivery> {
    accepted
        .seats
        .iter()
        .map(|seat| {
            let message = match result_for(seat.symbol, accepted.evaluation) {
                Some(result) => ServerMessage::GameEnded {
                    result,
                    board: accepted.board,
                },
                None => ServerMessage::MoveUpdate {
                    board: accepted.board,
                    turn_owner: accepted.turn_owner,
                },
            };
            Delivery::new(seat.connection_id, message)
        })
        .collect()
}

/// Chat fan-out to every member except the sender.
pub fn plan_chat(chat: &ChatMessage, members: &[ConnectionId]) -> Vec<Delivery> {
    members
        .iter()
        .filter(|id| **id != chat.sender_connection_id)
        .map(|id| {
            Delivery::new(
                *id,
                ServerMessage::ChatReceived {
                    text: chat.text.clone(),
                    sender_label: chat.sender_label.clone(),
                },
            )
        })
        .collect()
}

/// Tells whoever is left that the opponent is gone.
pub fn plan_departure(departure: &Departure) -> Vec<Delivery> {
    departure
        .remaining
        .iter()
        .map(|id| Delivery::new(*id, ServerMessage::OpponentLeft))
        .collect()
}

// ── Delivery ────────────────────────────────────────────────────────

/// Outbound side of the transport host.
pub trait Outbox: Send + Sync + 'static {
    /// Queue `message` for `to`.
    ///
    /// # Errors
    ///
    /// [`ArbiterError::NotConnected`] if `to` is unknown or its receiver is gone.
    fn deliver(&self, to: ConnectionId, message: ServerMessage) -> Result<()>;
}

/// Registry of per-connection outbound channels.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct ConnectionHub {
    senders: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection with a fresh id.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let connection_id = Uuid::new_v4();
        (connection_id, self.register_with(connection_id))
    }

    /// Registers `connection_id`, replacing any previous channel for it.
    pub fn register_with(
        &self,
        connection_id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection_id, tx);
        debug!(connection_id = %connection_id, "connection registered");
        rx
    }

    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&connection_id)
            .is_some()
    }

    pub fn is_registered(&self, connection_id: ConnectionId) -> bool {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Outbox for ConnectionHub {
    fn deliver(&self, to: ConnectionId, message: ServerMessage) -> Result<()> {
        let sender = self
            .senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&to)
            .cloned()
            .ok_or(ArbiterError::NotConnected)?;
        sender
            .send(message)
            .map_err(|_| ArbiterError::NotConnected)
    }
}

/// Hands planned deliveries to an [`Outbox`].
///
/// Delivery failures are logged and skipped: a peer that vanished must not
/// fail the operation that triggered the broadcast.
#[derive(Debug, Clone)]
pub struct RoomRouter<O> {
    outbox: O,
}

impl<O: Outbox> RoomRouter<O> {
    pub fn new(outbox: O) -> Self {
        Self { outbox }
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    /// Sends a reply to the requester only.
    pub fn reply(&self, to: ConnectionId, message: ServerMessage) -> bool {
        self.send(Delivery::new(to, message))
    }

    pub fn session_started(&self, start: &SessionStart) {
        self.dispatch(plan_session_start(start));
    }

    pub fn move_accepted(&self, accepted: &AcceptedMove) {
        self.dispatch(plan_move(accepted));
    }

    pub fn chat(&self, chat: &ChatMessage, members: &[ConnectionId]) {
        self.dispatch(plan_chat(chat, members));
    }

    pub fn departure(&self, departure: &Departure) {
        self.dispatch(plan_departure(departure));
    }

    /// Sends every delivery. Returns how many were accepted by the outbox.
    pub fn dispatch(&self, deliveries: Vec<Delivery>) -> usize {
        deliveries
            .into_iter()
            .map(|delivery| self.send(delivery))
            .filter(|sent| *sent)
            .count()
    }

    fn send(&self, delivery: Delivery) -> bool {
        let to = delivery.to;
        match self.outbox.deliver(to, delivery.message) {
            Ok(()) => true,
            Err(e) => {
                warn!(connection_id = %to, error = %e, "dropping outbound message");
                false
            }
        }
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
    use crate::board::Board;
    use crate::session::{Seat, SessionStatus};

    const A: Uuid = Uuid::from_u128(1);
    const B: Uuid = Uuid::from_u128(2);

    fn seats() -> Vec<Seat> {
        vec![
            Seat {
                connection_id: A,
                symbol: Symbol::X,
            },
            Seat {
                connection_id: B,
                symbol: Symbol::O,
            },
        ]
    }

    fn accepted(evaluation: Evaluation) -> AcceptedMove {
        AcceptedMove {
            room_id: "R1".into(),
            mover: A,
            symbol: Symbol::X,
            row: 0,
            col: 0,
            board: Board::new().place(0, 0, Symbol::X).unwrap(),
            turn_owner: B,
            evaluation,
            seats: seats(),
        }
    }

    #[test]
    fn session_start_is_individual() {
        let deliveries = plan_session_start(&SessionStart {
            room_id: "R1".into(),
            seats: seats(),
        });
        assert_eq!(
            deliveries,
            vec![
                Delivery::new(
                    A,
                    ServerMessage::SessionStarted {
                        symbol: Symbol::X,
                        starts_first: true
                    }
                ),
                Delivery::new(
                    B,
                    ServerMessage::SessionStarted {
                        symbol: Symbol::O,
                        starts_first: false
                    }
                ),
            ]
        );
    }

    #[test]
    fn move_update_goes_to_everyone() {
        let deliveries = plan_move(&accepted(Evaluation::Continue));
        assert_eq!(deliveries.len(), 2);
        for delivery in &deliveries {
            assert!(matches!(
                delivery.message,
                ServerMessage::MoveUpdate { turn_owner, .. } if turn_owner == B
            ));
        }
    }

    #[test]
    fn win_is_computed_per_recipient() {
        let deliveries = plan_move(&accepted(Evaluation::Win(Symbol::X)));
        let results: Vec<_> = deliveries
            .iter()
            .map(|d| match &d.message {
                ServerMessage::GameEnded { result, .. } => (d.to, *result),
                other => panic!("expected GameEnded, got {other:?}"),
            })
            .collect();
        assert_eq!(results, vec![(A, GameResult::Won), (B, GameResult::Lost)]);
    }

    #[test]
    fn draw_goes_to_both() {
        let deliveries = plan_move(&accepted(Evaluation::Draw));
        assert!(deliveries.iter().all(|d| matches!(
            d.message,
            ServerMessage::GameEnded {
                result: GameResult::Draw,
                ..
            }
        )));
    }

    #[test]
    fn chat_skips_sender() {
        let chat = ChatMessage {
            room_id: "R1".into(),
            sender_label: "Alice".into(),
            sender_connection_id: A,
            text: "hi".into(),
        };
        let deliveries = plan_chat(&chat, &[A, B]);
        assert_eq!(
            deliveries,
            vec![Delivery::new(
                B,
                ServerMessage::ChatReceived {
                    text: "hi".into(),
                    sender_label: "Alice".into()
                }
            )]
        );
    }

    #[test]
    fn departure_notifies_remaining() {
        let departure = Departure {
            room_id: "R1".into(),
            departed: A,
            remaining: vec![B],
            status: SessionStatus::Active,
        };
        assert_eq!(
            plan_departure(&departure),
            vec![Delivery::new(B, ServerMessage::OpponentLeft)]
        );
    }

    #[test]
    fn chat_validation() {
        assert_eq!(validate_chat("   ", 10), Err(ChatError::Empty));
        assert_eq!(validate_chat("", 10), Err(ChatError::Empty));
        assert_eq!(
            validate_chat("hello world", 5),
            Err(ChatError::TooLong { max: 5 })
        );
        assert_eq!(validate_chat(" hi ", 10), Ok(()));
        assert_eq!(ChatError::Empty.error_code(), ErrorCode::EmptyMessage);
    }

    #[tokio::test]
    async fn hub_delivers_and_router_skips_unknown() {
        let hub = ConnectionHub::new();
        let (id, mut rx) = hub.register();
        let router = RoomRouter::new(hub.clone());

        assert!(router.reply(id, ServerMessage::Pong));
        assert_eq!(rx.recv().await, Some(ServerMessage::Pong));

        let sent = router.dispatch(vec![
            Delivery::new(Uuid::from_u128(77), ServerMessage::Pong),
            Delivery::new(id, ServerMessage::OpponentLeft),
        ]);
        assert_eq!(sent, 1);
        assert_eq!(rx.recv().await, Some(ServerMessage::OpponentLeft));

        assert!(hub.unregister(id));
        assert!(!hub.is_registered(id));
        assert!(matches!(
            hub.deliver(id, ServerMessage::Pong),
            Err(ArbiterError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn hub_reports_dropped_receiver() {
        let hub = ConnectionHub::new();
        let (id, rx) = hub.register();
        drop(rx);
        assert!(hub.deliver(id, ServerMessage::Pong).is_err());
        assert_eq!(hub.len(), 1);
    }
}
