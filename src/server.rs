//! Authoritative game server: request dispatch and the per-connection loop.
//!
//! [`GameServer`] ties the [`SessionStore`], the turn arbiter and the
//! [`RoomRouter`] together. Transports are driven by [`serve_connection`],
//! one task per connection; with the `transport-websocket` feature
//! [`run_websocket_listener`] accepts WebSocket clients on a TCP listener.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::arbiter;
use crate::error::Result;
use crate::error_codes::ErrorCode;
use crate::protocol::{ClientMessage, ConnectionId, ServerMessage};
use crate::router::{
    validate_chat, ChatError, ChatMessage, ConnectionHub, RoomRouter, DEFAULT_MAX_CHAT_LEN,
};
use crate::session::{SessionStore, DEFAULT_MAX_ROOM_ID_LEN};
use crate::transport::Transport;

const DEFAULT_PLAYER_LABEL: &str = "Player";

// ── Configuration ───────────────────────────────────────────────────

/// Server limits and defaults.
///
/// ```
/// use tictactoe_arbiter::server::ServerConfig;
///
/// let config = ServerConfig::default().with_max_chat_len(140);
/// assert_eq!(config.max_chat_len, 140);
/// assert_eq!(config.max_room_id_len, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Longest accepted room id, in bytes. Defaults to **64**.
    pub max_room_id_len: usize,
    /// Longest accepted chat line, in characters. Defaults to **500**.
    pub max_chat_len: usize,
    /// Label for players that join without a name. Defaults to `"Player"`.
    pub default_player_label: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_room_id_len: DEFAULT_MAX_ROOM_ID_LEN,
            max_chat_len: DEFAULT_MAX_CHAT_LEN,
            default_player_label: DEFAULT_PLAYER_LABEL.to_string(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn with_max_room_id_len(mut self, len: usize) -> Self {
        self.max_room_id_len = len;
        self
    }

    #[must_use]
    pub fn with_max_chat_len(mut self, len: usize) -> Self {
        self.max_chat_len = len;
        self
    }

    #[must_use]
    pub fn with_default_player_label(mut self, label: impl Into<String>) -> Self {
        self.default_player_label = label.into();
        self
    }
}

// ── Server ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct ServerInner {
    config: ServerConfig,
    store: SessionStore,
    router: RoomRouter<ConnectionHub>,
}

/// Cheaply cloneable handle to one game server.
#[derive(Debug, Clone)]
pub struct GameServer {
    inner: Arc<ServerInner>,
}

impl Default for GameServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let store = SessionStore::with_max_room_id_len(config.max_room_id_len);
        Self {
            inner: Arc::new(ServerInner {
                config,
                store,
                router: RoomRouter::new(ConnectionHub::new()),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn hub(&self) -> &ConnectionHub {
        self.inner.router.outbox()
    }

    /// Registers a new connection and returns its id and outbound queue.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (connection_id, outbound) = self.hub().register();
        info!(connection_id = %connection_id, "connection opened");
        (connection_id, outbound)
    }

    /// Handles one request from `connection_id`. Replies and broadcasts are
    /// queued on the connections' outbound channels.
    pub async fn handle(&self, connection_id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::JoinRoom {
                room_id,
                player_name,
            } => self.join(connection_id, &room_id, player_name).await,
            ClientMessage::SubmitMove { row, col } => {
                self.submit_move(connection_id, row, col).await;
            }
            ClientMessage::SendChat { text } => self.chat(connection_id, text).await,
            ClientMessage::LeaveRoom => self.leave(connection_id).await,
            ClientMessage::Ping => {
                self.reply(connection_id, ServerMessage::Pong);
            }
        }
    }

    /// Parses `text` as a [`ClientMessage`] and handles it. Malformed input
    /// gets an `INVALID_MESSAGE` error reply.
    pub async fn handle_text(&self, connection_id: ConnectionId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(connection_id, message).await,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "malformed client message");
                self.reply(
                    connection_id,
                    ServerMessage::Error {
                        message: format!("invalid message: {e}"),
                        error_code: Some(ErrorCode::InvalidMessage),
                    },
                );
            }
        }
    }

    /// Tears down everything `connection_id` owned. A session it sat in is
    /// destroyed and the other participant receives `OpponentLeft`.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        if let Some(departure) = self.inner.store.depart(connection_id).await {
            self.inner.router.departure(&departure);
        }
        self.hub().unregister(connection_id);
        info!(connection_id = %connection_id, "connection closed");
    }

    async fn join(&self, connection_id: ConnectionId, room_id: &str, name: Option<String>) {
        let label = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.inner.config.default_player_label.clone());

        // Queue the join replies before the room unlocks so the first
        // MoveUpdate cannot overtake SessionStarted.
        let joined = self
            .inner
            .store
            .join_then(room_id, connection_id, label, |outcome| {
                self.reply(
                    connection_id,
                    ServerMessage::RoomJoined {
                        room_id: outcome.room_id.clone(),
                        connection_id,
                        role: outcome.role,
                    },
                );
                if let Some(start) = &outcome.start {
                    self.inner.router.session_started(start);
                }
            })
            .await;

        if let Err(e) = joined {
            debug!(connection_id = %connection_id, error = %e, "join refused");
            self.reply(
                connection_id,
                ServerMessage::RoomJoinError {
                    reason: e.to_string(),
                    error_code: e.error_code(),
                },
            );
        }
    }

    async fn submit_move(&self, connection_id: ConnectionId, row: usize, col: usize) {
        let handle = match self.inner.store.room_of(connection_id).await {
            Some(room_id) => self.inner.store.get(&room_id).await,
            None => None,
        };
        let Some(handle) = handle else {
            self.reject_move(connection_id, arbiter::MoveRejection::NoSuchRoom);
            return;
        };

        // Broadcast while the room is still locked so every participant sees
        // updates in the order they were applied.
        let mut session = handle.lock().await;
        match arbiter::arbitrate(&mut session, connection_id, row, col) {
            Ok(accepted) => self.inner.router.move_accepted(&accepted),
            Err(rejection) => self.reject_move(connection_id, rejection),
        }
    }

    fn reject_move(&self, connection_id: ConnectionId, rejection: arbiter::MoveRejection) {
        self.reply(
            connection_id,
            ServerMessage::MoveRejected {
                reason: rejection.to_string(),
                error_code: rejection.error_code(),
            },
        );
    }

    async fn chat(&self, connection_id: ConnectionId, text: String) {
        if let Err(e) = self.try_chat(connection_id, text).await {
            debug!(connection_id = %connection_id, error = %e, "chat refused");
            self.reply(
                connection_id,
                ServerMessage::ChatRejected {
                    reason: e.to_string(),
                    error_code: e.error_code(),
                },
            );
        }
    }

    async fn try_chat(
        &self,
        connection_id: ConnectionId,
        text: String,
    ) -> std::result::Result<(), ChatError> {
        validate_chat(&text, self.inner.config.max_chat_len)?;

        let room_id = self
            .inner
            .store
            .room_of(connection_id)
            .await
            .ok_or(ChatError::NotInRoom)?;
        let handle = self
            .inner
            .store
            .get(&room_id)
            .await
            .ok_or(ChatError::NotInRoom)?;

        let session = handle.lock().await;
        let sender = session
            .participant(connection_id)
            .filter(|_| session.is_open())
            .ok_or(ChatError::NotInRoom)?;
        let members: Vec<ConnectionId> = session
            .participants()
            .iter()
            .map(|p| p.connection_id)
            .collect();

        let chat = ChatMessage {
            room_id,
            sender_label: sender.label.clone(),
            sender_connection_id: connection_id,
            text,
        };
        self.inner.router.chat(&chat, &members);
        Ok(())
    }

    async fn leave(&self, connection_id: ConnectionId) {
        match self.inner.store.depart(connection_id).await {
            Some(departure) => {
                self.inner.router.departure(&departure);
                self.reply(connection_id, ServerMessage::RoomLeft);
            }
            None => {
                self.reply(
                    connection_id,
                    ServerMessage::Error {
                        message: "not in a room".into(),
                        error_code: Some(ErrorCode::NotInRoom),
                    },
                );
            }
        }
    }

    fn reply(&self, connection_id: ConnectionId, message: ServerMessage) {
        self.inner.router.reply(connection_id, message);
    }
}

// ── Connection loop ─────────────────────────────────────────────────

/// Serves one client over `transport` until it closes.
///
/// Inbound text is handed to [`GameServer::handle_text`]; queued outbound
/// messages are written as they arrive. On exit the connection is
/// disconnected from the server and the transport closed.
///
/// # Errors
///
/// The transport or serialization error that ended the loop. A clean close
/// by the peer returns `Ok(())`.
pub async fn serve_connection(server: GameServer, mut transport: impl Transport) -> Result<()> {
    let (connection_id, mut outbound) = server.connect();
    let result = pump(&server, connection_id, &mut transport, &mut outbound).await;
    if let Err(e) = &result {
        warn!(connection_id = %connection_id, error = %e, "connection failed");
    }
    server.disconnect(connection_id).await;
    let _ = transport.close().await;
    result
}

async fn pump<T: Transport>(
    server: &GameServer,
    connection_id: ConnectionId,
    transport: &mut T,
    outbound: &mut mpsc::UnboundedReceiver<ServerMessage>,
) -> Result<()> {
    loop {
        tokio::select! {
            Some(message) = outbound.recv() => {
                transport.send(serde_json::to_string(&message)?).await?;
            }

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => server.handle_text(connection_id, &text).await,
                Some(Err(e)) => return Err(e),
                None => {
                    debug!(connection_id = %connection_id, "peer closed the connection");
                    return Ok(());
                }
            },
        }
    }
}

/// Accepts WebSocket clients on `listener` forever, one task per connection.
///
/// # Errors
///
/// Returns when accepting on `listener` fails.
#[cfg(feature = "transport-websocket")]
pub async fn run_websocket_listener(
    server: GameServer,
    listener: tokio::net::TcpListener,
) -> Result<()> {
    use crate::transports::WebSocketTransport;

    info!(addr = ?listener.local_addr().ok(), "accepting WebSocket connections");
    loop {
        let (tcp, peer) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            match WebSocketTransport::accept(tcp).await {
                Ok(transport) => {
                    let _ = serve_connection(server, transport).await;
                }
                Err(e) => warn!(%peer, error = %e, "WebSocket handshake failed"),
            }
        });
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
    use crate::board::Symbol;
    use crate::protocol::Role;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn join(room: &str, name: &str) -> ClientMessage {
        ClientMessage::JoinRoom {
            room_id: room.into(),
            player_name: Some(name.into()),
        }
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let server = GameServer::default();
        let (a, mut rx) = server.connect();
        server.handle(a, ClientMessage::Ping).await;
        assert_eq!(drain(&mut rx), vec![ServerMessage::Pong]);
    }

    #[tokio::test]
    async fn second_join_starts_the_game_for_both() {
        let server = GameServer::default();
        let (a, mut rx_a) = server.connect();
        let (b, mut rx_b) = server.connect();

        server.handle(a, join("R1", "Alice")).await;
        server.handle(b, join("R1", "Bob")).await;

        assert_eq!(
            drain(&mut rx_a),
            vec![
                ServerMessage::RoomJoined {
                    room_id: "R1".into(),
                    connection_id: a,
                    role: Role::First
                },
                ServerMessage::SessionStarted {
                    symbol: Symbol::X,
                    starts_first: true
                },
            ]
        );
        assert_eq!(
            drain(&mut rx_b),
            vec![
                ServerMessage::RoomJoined {
                    room_id: "R1".into(),
                    connection_id: b,
                    role: Role::Second
                },
                ServerMessage::SessionStarted {
                    symbol: Symbol::O,
                    starts_first: false
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn session_start_reaches_o_before_first_move() {
        for round in 0..200 {
            let server = GameServer::default();
            let room = format!("race-{round}");
            let (a, _rx_a) = server.connect();
            let (b, mut rx_b) = server.connect();
            server.handle(a, join(&room, "Alice")).await;

            let joiner = {
                let server = server.clone();
                let room = room.clone();
                tokio::spawn(async move { server.handle(b, join(&room, "Bob")).await })
            };
            let mover = {
                let server = server.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        server
                            .handle(a, ClientMessage::SubmitMove { row: 0, col: 0 })
                            .await;
                        tokio::task::yield_now().await;
                    }
                })
            };
            joiner.await.unwrap();
            mover.await.unwrap();

            let received = drain(&mut rx_b);
            let started = received
                .iter()
                .position(|m| matches!(m, ServerMessage::SessionStarted { .. }))
                .unwrap();
            if let Some(update) = received
                .iter()
                .position(|m| matches!(m, ServerMessage::MoveUpdate { .. }))
            {
                assert!(started < update, "round {round}: {received:?}");
            }
        }
    }

    #[tokio::test]
    async fn blank_name_falls_back_to_default_label() {
        let server = GameServer::new(ServerConfig::default().with_default_player_label("Guest"));
        let (a, _rx) = server.connect();
        server
            .handle(
                a,
                ClientMessage::JoinRoom {
                    room_id: "R1".into(),
                    player_name: Some("  ".into()),
                },
            )
            .await;
        let session = server.store().snapshot("R1").await.unwrap();
        assert_eq!(session.participant(a).unwrap().label, "Guest");
    }

    #[tokio::test]
    async fn move_without_room_is_no_such_room() {
        let server = GameServer::default();
        let (a, mut rx) = server.connect();
        server
            .handle(a, ClientMessage::SubmitMove { row: 0, col: 0 })
            .await;
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::MoveRejected {
                error_code: ErrorCode::NoSuchRoom,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn chat_goes_to_peer_only() {
        let server = GameServer::default();
        let (a, mut rx_a) = server.connect();
        let (b, mut rx_b) = server.connect();
        server.handle(a, join("R1", "Alice")).await;
        server.handle(b, join("R1", "Bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        server
            .handle(
                a,
                ClientMessage::SendChat {
                    text: "hello".into(),
                },
            )
            .await;
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(
            drain(&mut rx_b),
            vec![ServerMessage::ChatReceived {
                text: "hello".into(),
                sender_label: "Alice".into()
            }]
        );
    }

    #[tokio::test]
    async fn chat_rejections() {
        let server = GameServer::new(ServerConfig::default().with_max_chat_len(3));
        let (a, mut rx) = server.connect();

        server
            .handle(a, ClientMessage::SendChat { text: "hi".into() })
            .await;
        server.handle(a, join("R1", "Alice")).await;
        server
            .handle(a, ClientMessage::SendChat { text: " ".into() })
            .await;
        server
            .handle(
                a,
                ClientMessage::SendChat {
                    text: "toolong".into(),
                },
            )
            .await;

        let codes: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::ChatRejected { error_code, .. } => Some(error_code),
                _ => None,
            })
            .collect();
        assert_eq!(
            codes,
            vec![
                ErrorCode::NotInRoom,
                ErrorCode::EmptyMessage,
                ErrorCode::MessageTooLong
            ]
        );
    }

    #[tokio::test]
    async fn leave_notifies_peer_and_confirms() {
        let server = GameServer::default();
        let (a, mut rx_a) = server.connect();
        let (b, mut rx_b) = server.connect();
        server.handle(a, join("R1", "Alice")).await;
        server.handle(b, join("R1", "Bob")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        server.handle(a, ClientMessage::LeaveRoom).await;
        assert_eq!(drain(&mut rx_a), vec![ServerMessage::RoomLeft]);
        assert_eq!(drain(&mut rx_b), vec![ServerMessage::OpponentLeft]);
        assert!(server.store().is_empty().await);

        server.handle(a, ClientMessage::LeaveRoom).await;
        assert!(matches!(
            drain(&mut rx_a).as_slice(),
            [ServerMessage::Error {
                error_code: Some(ErrorCode::NotInRoom),
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn malformed_text_gets_invalid_message() {
        let server = GameServer::default();
        let (a, mut rx) = server.connect();
        server.handle_text(a, r#"{"type":"teleport"}"#).await;
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error {
                error_code: Some(ErrorCode::InvalidMessage),
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn disconnect_unregisters_connection() {
        let server = GameServer::default();
        let (a, _rx) = server.connect();
        assert!(server.hub().is_registered(a));
        server.disconnect(a).await;
        assert!(!server.hub().is_registered(a));
    }
}
