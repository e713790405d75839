//! # Aetherion
//!
//! Authoritative real-time session server for a multiplayer arena.
//!
//! Clients connect over WebSocket, join a room, and from then on every
//! movement, attack and skill they report passes through a single
//! [`Coordinator`](coordinator::Coordinator) that validates it, updates
//! the player's session and fans the result out to the room.
//!
//! ```text
//! transport ─→ codec ─→ Coordinator ─┬─ SessionRegistry   (who, where, health)
//!                                    ├─ RoomManager       (lobby phases, spawns)
//!                                    ├─ movement          (speed / teleport checks)
//!                                    └─ combat            (range gate, damage)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aetherion::prelude::*;
//!
//! # async fn run() -> Result<(), AetherionError> {
//! let server = AetherionServer::builder()
//!     .config(ServerConfig::from_env()?)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod combat;
pub mod config;
pub mod coordinator;
mod error;
mod handler;
pub mod movement;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::AetherionError;
pub use server::{AetherionServer, AetherionServerBuilder};

pub mod prelude {
    pub use crate::coordinator::{Coordinator, StatsRequest};
    pub use crate::{AetherionError, AetherionServer, ServerConfig};
    pub use aetherion_protocol::{ClientEvent, ConnectionId, RoomId, ServerEvent};
    pub use aetherion_session::{BaselineStats, MemoryStats, StatsSource};
}
