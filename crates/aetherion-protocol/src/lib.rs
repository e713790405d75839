//! Wire protocol for the Aetherion session server.
//!
//! - **Events**: [`ClientEvent`] (inbound) and [`ServerEvent`] wrapped in
//!   a timestamped [`ServerEnvelope`] (outbound).
//! - **Routing**: [`Recipient`] names who receives an outbound event.
//! - **Codec**: the [`Codec`] trait and [`JsonCodec`].
//!
//! ```text
//! Transport (text frames) → Protocol (ClientEvent) → Coordinator
//! Coordinator → (Recipient, ServerEvent) → Protocol → Transport
//! ```

pub mod client;
mod codec;
mod error;
pub mod server;
mod types;

pub use aetherion_transport::ConnectionId;
pub use client::ClientEvent;
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use server::{ServerEnvelope, ServerEvent};
pub use types::{
    AttackType, EntityRef, Recipient, RoomId, RosterEntry, StatBlock, TargetType, Vec3,
    now_millis,
};
