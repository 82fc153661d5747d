//! Transport abstraction layer for waypost.
//!
//! Provides the [`Transport`] and [`Connection`] traits the relay core
//! is written against, plus the WebSocket implementation. The core only
//! ever sees "an accepted bidirectional message-oriented connection"
//! with send / recv / probe / close — everything protocol-specific
//! (upgrade handshakes, ping frames, the health-check line) stays in
//! this crate.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// A single connection that can send and receive message frames.
///
/// Implementations are cheap-to-clone handles (the relay stores one
/// copy per registry slot and one in the connection set), and carry
/// two flags the core reads without locking:
///
/// - **open** — cleared once the connection is closed or broken; used
///   to decide whether a host can still accept a guest.
/// - **alive** — the liveness monitor clears this each sweep and the
///   transport sets it again whenever a probe answer arrives. A
///   connection observed with the flag still clear a full sweep later
///   is dead and gets terminated.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends a message to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    /// Probe answers are consumed internally (they set the alive flag)
    /// and are never surfaced as messages.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Sends a liveness probe. The matching answer, observed at any
    /// later point in the read loop, sets the alive flag.
    async fn probe(&self) -> Result<(), Self::Error>;

    /// Closes the connection. Idempotent.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;

    /// Whether a probe answer has been seen since the flag was last
    /// cleared. Starts `true` on accept.
    fn is_alive(&self) -> bool;

    /// Clears the alive flag. Called by the liveness monitor right
    /// before probing.
    fn clear_alive(&self);

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
