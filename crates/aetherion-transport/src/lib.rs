//! Transport abstraction layer for the Aetherion session server.
//!
//! Provides the [`Transport`] and [`Connection`] traits so the session
//! server never touches socket types directly, plus the [`ConnectionId`]
//! and [`ConnectIdentity`] values that every accepted connection carries.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for a connection.
///
/// Valid for the lifetime of one connection and never persisted. On the
/// wire it appears as a bare number (the client calls it `socketId`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
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

/// Identity attached to a connection before any message is exchanged.
///
/// Token verification happens upstream of this server; by the time the
/// upgrade request reaches us the identity is trusted. Both fields are
/// optional so guests can connect without an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectIdentity {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

impl ConnectIdentity {
    /// Extracts `userId` and `username` from an upgrade request query
    /// string such as `userId=42&username=ayla`. Unknown keys and empty
    /// values are ignored.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut identity = Self::default();
        let Some(query) = query else {
            return identity;
        };
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "userId" => identity.user_id = Some(value.to_string()),
                "username" => identity.username = Some(value.replace('+', " ")),
                _ => {}
            }
        }
        identity
    }

    /// Returns `true` when no account is attached.
    pub fn is_guest(&self) -> bool {
        self.user_id.is_none()
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

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}

/// A single connection that exchanges text frames.
///
/// Sending and receiving are independent: a task blocked in
/// [`recv`](Connection::recv) must not hold up a concurrent
/// [`send`](Connection::send) from the writer task.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one text frame to the remote peer.
    async fn send(&self, text: &str) -> Result<(), Self::Error>;

    /// Receives the next message payload from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the identity established during the upgrade.
    fn identity(&self) -> &ConnectIdentity;
}
