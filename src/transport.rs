//! Transport abstraction shared by the game server and client.
//!
//! A [`Transport`] is a bidirectional channel of complete JSON text messages.
//! The server drives one per connection in
//! [`serve_connection`](crate::server::serve_connection); the client drives
//! one in the background task behind [`GameClient`](crate::client::GameClient).
//! Framing is the implementation's business.
//!
//! Connection setup is not part of the trait. Construct a connected transport
//! externally and hand it over.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tictactoe_arbiter::error::ArbiterError;
//! use tictactoe_arbiter::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ArbiterError> {
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ArbiterError>> {
//!         // None once the peer closed the connection cleanly.
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ArbiterError> {
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ArbiterError;

/// A bidirectional text message transport.
///
/// Each [`send`](Transport::send) transmits one complete JSON message and each
/// [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: it runs inside
/// `tokio::select!`, and a cancelled call followed by a new one must not lose
/// data. Channel-backed implementations are cancel-safe as is.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Sends one JSON text message to the peer.
    ///
    /// # Errors
    ///
    /// [`ArbiterError::TransportSend`] if the message could not be written.
    async fn send(&mut self, message: String) -> Result<(), ArbiterError>;

    /// Receives the next JSON text message.
    ///
    /// - `Some(Ok(text))`: one complete message
    /// - `Some(Err(e))`: a transport error
    /// - `None`: the peer closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, ArbiterError>>;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// regardless.
    async fn close(&mut self) -> Result<(), ArbiterError>;
}
