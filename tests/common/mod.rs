#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the integration tests.
//!
//! - [`MockTransport`] replays a script of incoming messages and records
//!   everything sent.
//! - [`ChannelTransport::pair`] connects two in-process endpoints, used to
//!   run a real [`GameServer`](tictactoe_arbiter::GameServer) against real
//!   clients.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tictactoe_arbiter::protocol::{ClientMessage, ServerMessage};
use tictactoe_arbiter::{ArbiterError, Transport};
use tokio::sync::mpsc;

pub type Sent = Arc<StdMutex<Vec<String>>>;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── MockTransport ───────────────────────────────────────────────────

/// Scripted transport. An explicit `None` entry is a clean close; once the
/// script is exhausted `recv` never resolves.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, ArbiterError>>>,
    pub sent: Sent,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(
        incoming: Vec<Option<Result<String, ArbiterError>>>,
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

    /// Script of well-formed server messages.
    pub fn replaying(messages: &[ServerMessage]) -> (Self, Sent, Arc<AtomicBool>) {
        Self::new(messages.iter().map(|m| Some(Ok(json(m)))).collect())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ArbiterError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ArbiterError>> {
        match self.incoming.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ArbiterError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Decodes everything a [`MockTransport`] recorded.
pub fn sent_client_messages(sent: &Sent) -> Vec<ClientMessage> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|s| serde_json::from_str(s).unwrap())
        .collect()
}

// ── ChannelTransport ────────────────────────────────────────────────

/// One end of an in-process duplex link. Dropping or closing one end makes
/// the other end's `recv` return `None`.
pub struct ChannelTransport {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: b_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: a_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<(), ArbiterError> {
        let tx = self.tx.as_ref().ok_or(ArbiterError::TransportClosed)?;
        tx.send(message)
            .map_err(|e| ArbiterError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ArbiterError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ArbiterError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

// ── JSON helpers ────────────────────────────────────────────────────

pub fn json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).expect("serialize")
}

/// Receives with a deadline so a missing message fails instead of hanging.
pub async fn recv_within<T>(rx: &mut mpsc::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

/// Like [`recv_within`] for unbounded receivers.
pub async fn recv_unbounded<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}
