//! Async game client.
//!
//! [`GameClient`] is a thin handle over a background transport loop. Commands
//! go to the loop on an unbounded channel; [`GameEvent`]s come back on the
//! bounded channel returned from [`GameClient::start`]. The loop folds every
//! server message into a shared [`Reconciler`] before emitting the matching
//! event, so the accessors already reflect an event by the time it is
//! received.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:8080").await?;
//! let (mut client, mut events) = GameClient::start(transport, ClientConfig::new("Alice"));
//!
//! client.join_room("R1")?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GameEvent::SessionStarted { starts_first: true, .. } => client.play(1, 1)?,
//!         GameEvent::GameEnded { result, .. } => println!("{}", result.message()),
//!         GameEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::board::{Board, Symbol};
use crate::error::{ArbiterError, Result};
use crate::event::GameEvent;
use crate::protocol::{ClientMessage, ConnectionId, GameResult, RoomId, ServerMessage};
use crate::reconciler::Reconciler;
use crate::router::{validate_chat, DEFAULT_MAX_CHAT_LEN};
use crate::transport::Transport;

const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`GameClient`].
///
/// ```
/// use std::time::Duration;
/// use tictactoe_arbiter::client::ClientConfig;
///
/// let config = ClientConfig::new("Alice")
///     .with_event_channel_capacity(64)
///     .with_shutdown_timeout(Duration::from_millis(250));
/// assert_eq!(config.player_name.as_deref(), Some("Alice"));
/// assert_eq!(config.event_channel_capacity, 64);
/// assert_eq!(config.max_chat_len, 500);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Label sent with every join. The server substitutes its default label
    /// when this is `None`.
    pub player_name: Option<String>,
    /// Capacity of the bounded event channel.
    ///
    /// Events are dropped with a warning while the channel is full, except
    /// `Disconnected`, which is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`GameClient::shutdown`] waits for the loop to close the
    /// transport before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Longest chat line [`GameClient::send_chat`] forwards, in characters.
    /// Should match the server's limit. Defaults to **500**.
    pub max_chat_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            player_name: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_chat_len: DEFAULT_MAX_CHAT_LEN,
        }
    }
}

impl ClientConfig {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            player_name: Some(player_name.into()),
            ..Self::default()
        }
    }

    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_chat_len(mut self, len: usize) -> Self {
        self.max_chat_len = len;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

struct ClientState {
    connected: AtomicBool,
    game: Mutex<Reconciler>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            game: Mutex::new(Reconciler::new()),
        }
    }

    fn game(&self) -> MutexGuard<'_, Reconciler> {
        self.game.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one player's connection.
///
/// Methods queue a [`ClientMessage`] for the transport loop and return
/// without waiting for the server.
pub struct GameClient {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<ClientState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
    player_name: Option<String>,
    max_chat_len: usize,
}

impl GameClient {
    /// Spawns the transport loop over a connected `transport`.
    ///
    /// The receiver yields [`GameEvent::Connected`] first and
    /// [`GameEvent::Disconnected`] last.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<GameEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let state = Arc::new(ClientState::new());
        let task = tokio::spawn(transport_loop(
            transport,
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
            player_name: config.player_name,
            max_chat_len: config.max_chat_len,
        };
        (client, event_rx)
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Joins (or creates) `room_id`.
    ///
    /// # Errors
    ///
    /// [`ArbiterError::NotConnected`] if the transport loop has stopped.
    pub fn join_room(&self, room_id: impl Into<RoomId>) -> Result<()> {
        self.send(ClientMessage::JoinRoom {
            room_id: room_id.into(),
            player_name: self.player_name.clone(),
        })
    }

    /// Plays at `(row, col)`.
    ///
    /// The move is checked against the cached state first and applied
    /// optimistically; the next server update overwrites it either way.
    ///
    /// # Errors
    ///
    /// - [`ArbiterError::NotConnected`] if the transport loop has stopped.
    ///   A mark applied before the loop was found gone is withdrawn.
    /// - [`ArbiterError::LocalMove`] if the move cannot be valid. Nothing is
    ///   sent in that case.
    pub fn play(&self, row: usize, col: usize) -> Result<()> {
        self.ensure_connected()?;
        let msg = self.state.game().try_move(row, col)?;
        if let Err(e) = self.send(msg) {
            self.state.game().discard_pending();
            return Err(e);
        }
        Ok(())
    }

    /// Sends a chat line to the opponent. The line is echoed locally as
    /// [`GameEvent::ChatEchoed`] once it is on the wire.
    ///
    /// # Errors
    ///
    /// - [`ArbiterError::Chat`] for blank text or text over
    ///   [`ClientConfig::max_chat_len`].
    /// - [`ArbiterError::NotInRoom`] if the client has not joined a room.
    /// - [`ArbiterError::NotConnected`] if the transport loop has stopped.
    pub fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        validate_chat(&text, self.max_chat_len)?;
        if self.room_id().is_none() {
            return Err(ArbiterError::NotInRoom);
        }
        self.send(ClientMessage::SendChat { text })
    }

    /// Leaves the current room, abandoning any game in progress.
    ///
    /// # Errors
    ///
    /// [`ArbiterError::NotConnected`] if the transport loop has stopped.
    pub fn leave_room(&self) -> Result<()> {
        self.send(ClientMessage::LeaveRoom)
    }

    /// # Errors
    ///
    /// [`ArbiterError::NotConnected`] if the transport loop has stopped.
    pub fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping)
    }

    /// Closes the transport and stops the loop, aborting it if it does not
    /// finish within the configured timeout.
    pub async fn shutdown(&mut self) {
        debug!("GameClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// The board as this player sees it, including a pending optimistic move.
    pub fn board(&self) -> Board {
        *self.state.game().board()
    }

    pub fn is_my_turn(&self) -> bool {
        self.state.game().is_my_turn()
    }

    pub fn my_symbol(&self) -> Option<Symbol> {
        self.state.game().symbol()
    }

    pub fn result(&self) -> Option<GameResult> {
        self.state.game().result()
    }

    /// Assigned by the server on the first successful join.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.state.game().connection_id()
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.state.game().room_id().map(str::to_string)
    }

    /// A copy of the whole cached game state.
    pub fn snapshot(&self) -> Reconciler {
        self.state.game().clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ArbiterError::NotConnected)
        }
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        self.ensure_connected()?;
        self.cmd_tx
            .send(msg)
            .map_err(|_| ArbiterError::NotConnected)
    }
}

impl std::fmt::Debug for GameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("connected", &self.is_connected())
            .field("room_id", &self.room_id())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        // No executor here to drive a graceful close; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Multiplexes outgoing commands, the shutdown signal and incoming server
/// messages until one side closes.
async fn transport_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<GameEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("client transport loop started");
    emit_event(&event_tx, GameEvent::Connected);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("command channel closed, shutting down transport loop");
                    let _ = transport.close().await;
                    emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                    break;
                };
                let echo = match &msg {
                    ClientMessage::SendChat { text } => Some(text.clone()),
                    _ => None,
                };
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("failed to serialize ClientMessage: {e}");
                        continue;
                    }
                };
                if let Err(e) = transport.send(json).await {
                    error!("transport send error: {e}");
                    emit_disconnected(
                        &event_tx,
                        &state,
                        Some(format!("transport send error: {e}")),
                    ).await;
                    break;
                }
                if let Some(text) = echo {
                    emit_event(&event_tx, GameEvent::ChatEchoed { text });
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(server_msg) => {
                            let me = {
                                let mut game = state.game();
                                game.apply(&server_msg);
                                game.connection_id()
                            };
                            emit_event(&event_tx, GameEvent::from_server(server_msg, me));
                        }
                        Err(e) => {
                            warn!("failed to deserialize server message: {e} (raw: {text})");
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(
                            &event_tx,
                            &state,
                            Some(format!("transport receive error: {e}")),
                        ).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        emit_disconnected(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("client transport loop exited");
}

/// Drops the event with a warning when the channel is full so the loop never
/// blocks on a slow consumer.
fn emit_event(event_tx: &mpsc::Sender<GameEvent>, event: GameEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// `Disconnected` is the last event and is awaited, never dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<GameEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    if event_tx
        .send(GameEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::reconciler::LocalMoveError;
    use crate::router::ChatError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    const ME: Uuid = Uuid::from_u128(10);
    const PEER: Uuid = Uuid::from_u128(20);

    type Sent = Arc<StdMutex<Vec<String>>>;

    /// Records sent messages and replays a script; hangs once the script is
    /// exhausted.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, ArbiterError>>>,
        sent: Sent,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(script: Vec<ServerMessage>) -> (Self, Sent, Arc<AtomicBool>) {
            Self::raw(
                script
                    .iter()
                    .map(|m| Some(Ok(serde_json::to_string(m).unwrap())))
                    .collect(),
            )
        }

        fn raw(
            incoming: Vec<Option<std::result::Result<String, ArbiterError>>>,
        ) -> (Self, Sent, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), ArbiterError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ArbiterError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ArbiterError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn joined() -> ServerMessage {
        ServerMessage::RoomJoined {
            room_id: "R1".into(),
            connection_id: ME,
            role: Role::First,
        }
    }

    fn started_as_x() -> ServerMessage {
        ServerMessage::SessionStarted {
            symbol: Symbol::X,
            starts_first: true,
        }
    }

    fn sent_messages(sent: &Sent) -> Vec<ClientMessage> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }

    async fn next_event(events: &mut mpsc::Receiver<GameEvent>) -> GameEvent {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        assert_eq!(next_event(&mut events).await, GameEvent::Connected);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_room_sends_configured_name() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::new("Alice"));
        next_event(&mut events).await;

        client.join_room("R1").unwrap();
        settle().await;

        assert_eq!(
            sent_messages(&sent),
            vec![ClientMessage::JoinRoom {
                room_id: "R1".into(),
                player_name: Some("Alice".into()),
            }]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn state_follows_server_messages() {
        let (transport, _sent, _closed) = MockTransport::new(vec![joined(), started_as_x()]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());

        next_event(&mut events).await; // Connected
        assert!(matches!(
            next_event(&mut events).await,
            GameEvent::RoomJoined { role: Role::First, .. }
        ));
        assert_eq!(
            next_event(&mut events).await,
            GameEvent::SessionStarted {
                symbol: Symbol::X,
                starts_first: true
            }
        );

        assert_eq!(client.connection_id(), Some(ME));
        assert_eq!(client.room_id().as_deref(), Some("R1"));
        assert_eq!(client.my_symbol(), Some(Symbol::X));
        assert!(client.is_my_turn());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn play_applies_optimistically_and_sends() {
        let (transport, sent, _closed) = MockTransport::new(vec![joined(), started_as_x()]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        for _ in 0..3 {
            next_event(&mut events).await;
        }

        client.play(1, 1).unwrap();
        assert_eq!(client.board().cell(1, 1), Some(Cell::Taken(Symbol::X)));
        assert!(!client.is_my_turn());

        let err = client.play(0, 0).unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::LocalMove(LocalMoveError::NotYourTurn)
        ));

        settle().await;
        assert_eq!(
            sent_messages(&sent),
            vec![ClientMessage::SubmitMove { row: 1, col: 1 }]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn play_withdraws_mark_when_loop_is_gone() {
        let (transport, _sent, _closed) = MockTransport::new(vec![joined(), started_as_x()]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        for _ in 0..3 {
            next_event(&mut events).await;
        }

        // Commands go nowhere while the loop itself keeps running, so the
        // connected flag stays set.
        let (orphan_tx, orphan_rx) = mpsc::unbounded_channel();
        drop(orphan_rx);
        let _live_tx = std::mem::replace(&mut client.cmd_tx, orphan_tx);
        assert!(client.is_connected());

        let err = client.play(1, 1).unwrap_err();
        assert!(matches!(err, ArbiterError::NotConnected));
        assert_eq!(client.board(), Board::new());
        assert!(client.is_my_turn());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn play_before_start_sends_nothing() {
        let (transport, sent, _closed) = MockTransport::new(vec![joined()]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        next_event(&mut events).await;
        next_event(&mut events).await;

        let err = client.play(0, 0).unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::LocalMove(LocalMoveError::NotStarted)
        ));
        settle().await;
        assert!(sent_messages(&sent).is_empty());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn board_update_reports_turn() {
        let board = Board::new().place(0, 0, Symbol::X).unwrap();
        let (transport, _sent, _closed) = MockTransport::new(vec![
            joined(),
            started_as_x(),
            ServerMessage::MoveUpdate {
                board,
                turn_owner: PEER,
            },
        ]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        for _ in 0..3 {
            next_event(&mut events).await;
        }
        assert_eq!(
            next_event(&mut events).await,
            GameEvent::BoardUpdated {
                board,
                turn_owner: PEER,
                your_turn: false
            }
        );
        assert_eq!(client.board(), board);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn chat_is_echoed_after_sending() {
        let (transport, sent, _closed) = MockTransport::new(vec![joined()]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        next_event(&mut events).await;
        next_event(&mut events).await;

        client.send_chat("good luck").unwrap();
        assert_eq!(
            next_event(&mut events).await,
            GameEvent::ChatEchoed {
                text: "good luck".into()
            }
        );
        assert_eq!(
            sent_messages(&sent),
            vec![ClientMessage::SendChat {
                text: "good luck".into()
            }]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn blank_chat_and_chat_outside_room_are_refused() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        next_event(&mut events).await;

        assert!(matches!(
            client.send_chat("   "),
            Err(ArbiterError::Chat(ChatError::Empty))
        ));
        assert!(matches!(
            client.send_chat("hello"),
            Err(ArbiterError::NotInRoom)
        ));
        settle().await;
        assert!(sent_messages(&sent).is_empty());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn overlong_chat_is_refused_locally() {
        let (transport, sent, _closed) = MockTransport::new(vec![joined()]);
        let config = ClientConfig::default().with_max_chat_len(5);
        let (mut client, mut events) = GameClient::start(transport, config);
        next_event(&mut events).await;
        next_event(&mut events).await;

        assert!(matches!(
            client.send_chat("too long"),
            Err(ArbiterError::Chat(ChatError::TooLong { max: 5 }))
        ));
        client.send_chat("héllo").unwrap();
        settle().await;
        assert_eq!(
            sent_messages(&sent),
            vec![ClientMessage::SendChat {
                text: "héllo".into()
            }]
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn move_rejection_restores_turn() {
        let (transport, _sent, _closed) = MockTransport::new(vec![joined(), started_as_x()]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        for _ in 0..3 {
            next_event(&mut events).await;
        }
        client.play(2, 2).unwrap();
        assert!(!client.is_my_turn());

        // Feed the rejection through the same path the loop uses.
        client.state.game().apply(&ServerMessage::MoveRejected {
            reason: "not your turn".into(),
            error_code: ErrorCode::NotYourTurn,
        });
        assert!(client.is_my_turn());
        assert_eq!(client.board(), Board::new());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_server_message_is_skipped() {
        let (transport, _sent, _closed) = MockTransport::raw(vec![
            Some(Ok("{not json".into())),
            Some(Ok(serde_json::to_string(&ServerMessage::Pong).unwrap())),
        ]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        next_event(&mut events).await;
        assert_eq!(next_event(&mut events).await, GameEvent::Pong);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn disconnected_on_transport_close() {
        let (transport, _sent, _closed) = MockTransport::raw(vec![None]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        next_event(&mut events).await;
        assert_eq!(
            next_event(&mut events).await,
            GameEvent::Disconnected { reason: None }
        );
        assert!(!client.is_connected());
        assert!(matches!(client.ping(), Err(ArbiterError::NotConnected)));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_error_emits_disconnected_with_reason() {
        let (transport, _sent, _closed) =
            MockTransport::raw(vec![Some(Err(ArbiterError::TransportReceive("reset".into())))]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        next_event(&mut events).await;
        match next_event(&mut events).await {
            GameEvent::Disconnected { reason: Some(reason) } => assert!(reason.contains("reset")),
            other => panic!("expected Disconnected, got {other:?}"),
        }
        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_transport() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = GameClient::start(transport, ClientConfig::default());
        next_event(&mut events).await;

        client.shutdown().await;
        assert!(closed.load(Ordering::Relaxed));
        assert!(matches!(
            next_event(&mut events).await,
            GameEvent::Disconnected { .. }
        ));
        assert!(matches!(client.play(0, 0), Err(ArbiterError::NotConnected)));

        // Second shutdown is a no-op.
        client.shutdown().await;
    }

    #[test]
    fn config_defaults_and_clamp() {
        let config = ClientConfig::default();
        assert_eq!(config.player_name, None);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.max_chat_len, 500);

        let config = ClientConfig::new("Bob").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn full_event_channel_drops_but_keeps_disconnected() {
        let mut script: Vec<_> = (0..10)
            .map(|_| Some(Ok(serde_json::to_string(&ServerMessage::Pong).unwrap())))
            .collect();
        script.push(None);
        let (transport, _sent, _closed) = MockTransport::raw(script);
        let config = ClientConfig::default().with_event_channel_capacity(2);
        let (mut client, mut events) = GameClient::start(transport, config);

        settle().await;
        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            received.push(event);
        }
        assert!(received.len() < 12);
        assert!(matches!(
            received.last(),
            Some(GameEvent::Disconnected { .. })
        ));
        client.shutdown().await;
    }

    /// `close()` never returns, so shutdown has to abort the loop.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), ArbiterError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ArbiterError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ArbiterError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_loop() {
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            dropped: Arc::clone(&dropped),
        };
        let config = ClientConfig::default().with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) = GameClient::start(transport, config);
        next_event(&mut events).await;

        client.shutdown().await;
        assert!(dropped.load(Ordering::Acquire));
        assert!(!client.is_connected());
    }
}
