//! Transport abstraction layer for Duet.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the socket implementation, plus the shared connection lifecycle
//! ([`spawn_link`]) both socket kinds run on: a reader task, a writer task,
//! a bounded [`Outbox`] and a cooperative [`Cancel`] handle.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

mod cancel;
mod error;
mod link;
pub mod memory;
mod request;
#[cfg(feature = "websocket")]
mod websocket;

pub use cancel::Cancel;
pub use error::TransportError;
pub use link::{spawn_link, LinkConfig, Outbox, WriteMode};
pub use request::ConnectRequest;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingUpgrade, WebSocketConnection, WebSocketTransport, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_MAX_MESSAGE_SIZE,
};

use std::fmt;
use std::future::Future;

/// WebSocket close code sent when the server ends a connection.
pub const CLOSE_CODE: u16 = 1028;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
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

/// An outgoing wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame (session socket).
    Text(String),
    /// Binary frame (room socket).
    Binary(Vec<u8>),
    /// Keepalive probe.
    Ping,
    /// Close frame with the given code.
    Close(u16),
}

/// Something read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Payload of a text or binary frame.
    Data(Vec<u8>),
    /// Keepalive acknowledgement.
    Pong,
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// An accepted connection still waiting for its handshake.
    type Pending: Upgrade<Connection = Self::Connection, Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming connection.
    ///
    /// Only the accept itself happens here; the handshake is left to
    /// [`Upgrade::upgrade`] so one slow client cannot hold up the next.
    fn accept(&mut self) -> impl Future<Output = Result<Self::Pending, Self::Error>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Completes the handshake of an accepted connection.
pub trait Upgrade: Send + 'static {
    /// The connection produced by the handshake.
    type Connection: Connection;
    /// The error type for the handshake.
    type Error: std::error::Error + Send + Sync;

    /// Finishes the handshake and returns the connection together with the
    /// request it was opened with.
    fn upgrade(
        self,
    ) -> impl Future<Output = Result<(Self::Connection, ConnectRequest), Self::Error>> + Send;
}

/// A single connection that can send and receive frames.
///
/// Sending and receiving must be usable concurrently: the lifecycle runs a
/// reader and a writer task over the same connection.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends a frame to the remote peer.
    fn send(&self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Inbound>, Self::Error>> + Send;

    /// Closes the connection with the given close code.
    fn close(&self, code: u16) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
