//! Shared value types that appear in both inbound and outbound events.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use aetherion_transport::ConnectionId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a room (one lobby/game instance).
///
/// Room ids are issued by the room-persistence service, so they are
/// opaque strings rather than counters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference to something that can attack or be attacked.
///
/// Players are addressed by their numeric connection id; NPCs by the
/// string id the client assigned them. Untagged so both `7` and
/// `"goblin-3"` decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Connection(ConnectionId),
    Named(String),
}

impl EntityRef {
    /// Interprets the reference as a player connection.
    ///
    /// Clients sometimes stringify socket ids, so a numeric string is
    /// accepted as well.
    pub fn as_connection(&self) -> Option<ConnectionId> {
        match self {
            Self::Connection(id) => Some(*id),
            Self::Named(s) => s.parse::<u64>().ok().map(ConnectionId::new),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(id) => write!(f, "{id}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point or direction in world space (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// `false` if any component is NaN or infinite.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

// ---------------------------------------------------------------------------
// Character stats
// ---------------------------------------------------------------------------

/// SPECIAL attribute snapshot for one character.
///
/// Pulled once from storage at join time; the server never writes it back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatBlock {
    pub strength: f32,
    pub perception: f32,
    pub endurance: f32,
    pub charisma: f32,
    pub intelligence: f32,
    pub agility: f32,
    pub luck: f32,
}

impl StatBlock {
    /// Max health used until (or unless) real stats arrive.
    pub const BASELINE_MAX_HEALTH: f32 = 100.0;

    /// Every attribute at 1. Used for guests and when storage has no
    /// character on record.
    pub const fn baseline() -> Self {
        Self {
            strength: 1.0,
            perception: 1.0,
            endurance: 1.0,
            charisma: 1.0,
            intelligence: 1.0,
            agility: 1.0,
            luck: 1.0,
        }
    }

    /// Max health derived from endurance for characters loaded from storage.
    pub fn max_health(&self) -> f32 {
        200.0 + self.endurance * 40.0
    }
}

impl Default for StatBlock {
    fn default() -> Self {
        Self::baseline()
    }
}

// ---------------------------------------------------------------------------
// Combat vocabulary
// ---------------------------------------------------------------------------

/// Attack category; selects the range gate and the stat weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackType {
    #[default]
    Melee,
    Ranged,
    Magic,
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Melee => write!(f, "melee"),
            Self::Ranged => write!(f, "ranged"),
            Self::Magic => write!(f, "magic"),
        }
    }
}

/// What kind of entity an attack is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Player,
    Enemy,
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// One player as seen by the rest of the room.
///
/// Sent in `room_players`, `player_joined` and `game_start` so every
/// client can spawn every participant at its assigned slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub socket_id: ConnectionId,
    pub user_id: Option<String>,
    pub username: String,
    pub character_class: String,
    pub spawn_index: usize,
    pub position: Vec3,
    pub rotation: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub is_alive: bool,
    pub animation: String,
    pub kills: u32,
    pub deaths: u32,
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Routing target for an outbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Only this connection (replies, corrections, catch-up).
    Connection(ConnectionId),

    /// Every member of the room, sender included.
    Room(RoomId),

    /// Every member of the room except one connection, normally the
    /// sender whose own client already applied the change.
    RoomExcept(RoomId, ConnectionId),
}

/// Milliseconds since the UNIX epoch, used to stamp outbound events.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
