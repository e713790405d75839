//! Error types for the session layer.

use aetherion_protocol::ConnectionId;

/// Errors raised by the connection registry and stat sources.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session is already registered for this connection. Callers
    /// must remove the old one first (for example when switching rooms).
    #[error("connection {0} already has a session")]
    AlreadyRegistered(ConnectionId),

    /// The stat store could not be reached or returned garbage.
    /// The session keeps its baseline stats.
    #[error("stats unavailable: {0}")]
    StatsUnavailable(String),
}
