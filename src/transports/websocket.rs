//! WebSocket transport using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] serves both ends of a game connection: clients dial
//! with [`connect`](WebSocketTransport::connect), the server upgrades accepted
//! TCP sockets with [`accept`](WebSocketTransport::accept). One JSON message
//! travels in one text frame.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), tictactoe_arbiter::ArbiterError> {
//! use tictactoe_arbiter::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:8080").await?;
//! transport
//!     .send(r#"{"type":"JoinRoom","data":{"room_id":"R1"}}"#.to_string())
//!     .await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

use crate::error::ArbiterError;
use crate::transport::Transport;

/// The underlying WebSocket stream, for use with
/// [`WebSocketTransport::from_stream`].
pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

fn io_error(e: tokio_tungstenite::tungstenite::Error) -> ArbiterError {
    let kind = match &e {
        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    ArbiterError::Io(std::io::Error::new(kind, e))
}

/// A [`Transport`] backed by a WebSocket connection.
///
/// [`recv`](Transport::recv) is cancel-safe: the stream only yields a frame
/// once it has been read completely.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Dials a game server. `ws://` and `wss://` are supported.
    ///
    /// # Errors
    ///
    /// [`ArbiterError::Io`] if the URL is invalid or the handshake fails. The
    /// I/O [`ErrorKind`](std::io::ErrorKind) is kept when there is one.
    pub async fn connect(url: &str) -> Result<Self, ArbiterError> {
        tracing::debug!(url = %url, "connecting to game server");
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(io_error)?;
        tracing::info!(url = %url, "WebSocket connection established");
        Ok(Self::from_stream(stream))
    }

    /// [`connect`](Self::connect) with a deadline.
    ///
    /// # Errors
    ///
    /// [`ArbiterError::Timeout`] if `timeout` elapses first.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, ArbiterError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| ArbiterError::Timeout)?
    }

    /// Performs the server side of the WebSocket handshake on an accepted
    /// TCP connection.
    ///
    /// # Errors
    ///
    /// [`ArbiterError::Io`] if the handshake fails.
    pub async fn accept(tcp: TcpStream) -> Result<Self, ArbiterError> {
        let peer = tcp.peer_addr().ok();
        let stream = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(tcp))
            .await
            .map_err(io_error)?;
        tracing::debug!(?peer, "WebSocket handshake accepted");
        Ok(Self::from_stream(stream))
    }

    /// Wraps an already-established stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ArbiterError> {
        if self.closed {
            return Err(ArbiterError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| ArbiterError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ArbiterError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(ArbiterError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("skipping binary WebSocket frame");
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), ArbiterError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ArbiterError::TransportSend(e.to_string()))
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
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    #[test]
    fn websocket_transport_is_send_and_debug() {
        fn assert_bounds<T: Send + std::fmt::Debug>() {}
        assert_bounds::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-url").await.unwrap_err();
        assert!(matches!(err, ArbiterError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, ArbiterError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // TEST-NET-1, never routable.
        let err =
            WebSocketTransport::connect_with_timeout("ws://192.0.2.1:1", Duration::from_millis(50))
                .await
                .unwrap_err();
        assert!(matches!(err, ArbiterError::Timeout));
    }

    /// Binds a listener and returns its URL plus a receiver for the accepted
    /// server-side transport.
    async fn listen() -> (String, oneshot::Receiver<WebSocketTransport>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let transport = WebSocketTransport::accept(tcp).await.unwrap();
            let _ = tx.send(transport);
        });
        (format!("ws://{addr}"), rx)
    }

    #[tokio::test]
    async fn accepted_and_dialed_ends_exchange_text() {
        let (url, accepted) = listen().await;
        let mut client = WebSocketTransport::connect(&url).await.unwrap();
        let mut server = accepted.await.unwrap();

        client.send(r#"{"type":"Ping"}"#.into()).await.unwrap();
        assert_eq!(server.recv().await.unwrap().unwrap(), r#"{"type":"Ping"}"#);

        server.send(r#"{"type":"Pong"}"#.into()).await.unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), r#"{"type":"Pong"}"#);
    }

    #[tokio::test]
    async fn close_is_seen_as_end_of_stream() {
        let (url, accepted) = listen().await;
        let mut client = WebSocketTransport::connect(&url).await.unwrap();
        let mut server = accepted.await.unwrap();

        client.close().await.unwrap();
        assert!(server.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after".into())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let mut client = WebSocketTransport::connect(&format!("ws://{addr}"))
            .await
            .unwrap();
        assert_eq!(client.recv().await.unwrap().unwrap(), "after");
    }

    #[tokio::test]
    async fn send_after_close_fails_and_close_is_idempotent() {
        let (url, _accepted) = listen().await;
        let mut client = WebSocketTransport::connect(&url).await.unwrap();

        client.close().await.unwrap();
        client.close().await.unwrap();
        let err = client.send("late".into()).await.unwrap_err();
        assert!(matches!(err, ArbiterError::TransportClosed));
    }
}
