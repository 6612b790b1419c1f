//! # tictactoe-arbiter
//!
//! Authoritative two-player tic-tac-toe over any bidirectional text transport.
//!
//! The server side pairs connections into rooms, arbitrates every move
//! against the room's single authoritative board, and routes the results to
//! the right participants. The client side keeps a local mirror of that state
//! so a UI can show moves optimistically and reconcile on every update.
//!
//! | Module         | Role                                               |
//! |----------------|----------------------------------------------------|
//! | [`board`]      | 3×3 grid, placement and win/draw evaluation        |
//! | [`session`]    | room registry, pairing and symbol assignment       |
//! | [`arbiter`]    | move validation and application                    |
//! | [`router`]     | who receives which message                         |
//! | [`reconciler`] | client-side cache of authoritative state           |
//! | [`server`]     | request dispatch and the per-connection loop       |
//! | `client`       | async client handle (feature `tokio-runtime`)      |
//!
//! Messages are JSON, adjacently tagged: `{"type": "...", "data": {...}}`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> Result<(), tictactoe_arbiter::ArbiterError> {
//! use tictactoe_arbiter::server::{run_websocket_listener, GameServer, ServerConfig};
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! run_websocket_listener(GameServer::new(ServerConfig::default()), listener).await
//! # }
//! ```

pub mod arbiter;
pub mod board;
#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod protocol;
pub mod reconciler;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;
pub mod transports;

pub use board::{Board, Cell, Evaluation, Symbol};
#[cfg(feature = "tokio-runtime")]
pub use client::{ClientConfig, GameClient};
pub use error::ArbiterError;
pub use error_codes::ErrorCode;
pub use event::GameEvent;
pub use protocol::{ClientMessage, GameResult, ServerMessage};
pub use reconciler::Reconciler;
pub use server::{serve_connection, GameServer, ServerConfig};
pub use session::SessionStore;
pub use transport::Transport;
#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
