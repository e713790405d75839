//! Room lifecycle for the Aetherion session server.
//!
//! - [`RoomManager`] owns every live [`Room`] and the connection → room
//!   index.
//! - [`LobbyMachine`] runs the Waiting → Lobby → Countdown → Active
//!   phases as explicit state plus a deadline.
//! - [`SpawnSlotPool`] hands out spawn locations.
//!
//! Nothing in this crate touches the network or sleeps. Callers pass the
//! current [`Instant`](std::time::Instant) in and get [`PhaseEvent`]s out.

mod config;
mod error;
mod lobby;
mod manager;
mod room;
mod spawn;

pub use config::{RoomConfig, RoomPhase, SpawnExhaustion};
pub use error::RoomError;
pub use lobby::{LobbyMachine, PhaseEvent};
pub use manager::{Departure, RoomManager};
pub use room::{Admission, Room};
pub use spawn::{SpawnSlot, SpawnSlotPool};
