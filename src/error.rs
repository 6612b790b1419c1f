//! Crate-level error type for the tic-tac-toe arbiter.
//!
//! Game rule rejections have their own enums next to the code that produces
//! them ([`JoinError`](crate::session::JoinError),
//! [`MoveRejection`](crate::arbiter::MoveRejection),
//! [`ChatError`](crate::router::ChatError),
//! [`LocalMoveError`](crate::reconciler::LocalMoveError)). This module covers
//! connection, transport and serialization failures, and wraps the rule
//! rejections that surface through the client handle.

use thiserror::Error;

use crate::reconciler::LocalMoveError;
use crate::router::ChatError;

/// Errors that can occur when running the arbiter or a game client.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The target connection is not (or no longer) connected.
    #[error("not connected")]
    NotConnected,

    /// Attempted a room operation but the client is not in a room.
    #[error("not in a room")]
    NotInRoom,

    /// A move was refused locally before reaching the server.
    #[error("move refused: {0}")]
    LocalMove(#[from] LocalMoveError),

    /// A chat message was refused before reaching the server.
    #[error("chat refused: {0}")]
    Chat(#[from] ChatError),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for arbiter operations.
pub type Result<T> = std::result::Result<T, ArbiterError>;
