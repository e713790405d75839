//! Connection registry for the Aetherion session server.
//!
//! - [`SessionRegistry`]: the source of truth for who is online, in
//!   which room, and in what state.
//! - [`PlayerSession`]: one connected player's transient state.
//! - [`StatsSource`]: the narrow window into character storage.
//!
//! ```text
//! Coordinator (above)  ← resolves every message against the registry
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← ConnectionId, RoomId, StatBlock, RosterEntry
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod registry;
mod session;
mod stats;

pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{
    DEAD_ANIMATION, DamageOutcome, IDLE_ANIMATION, JoinInfo, PlayerSession, SessionUpdate,
};
pub use stats::{BaselineStats, MemoryStats, StatsSource};
