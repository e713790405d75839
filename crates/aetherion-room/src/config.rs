//! Room configuration and lifecycle phases.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SpawnExhaustion
// ---------------------------------------------------------------------------

/// What to do when every spawn slot in a room is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnExhaustion {
    /// Hand out a random already-held slot. Players may overlap visually
    /// but nobody is turned away.
    #[default]
    ReuseRandom,
    /// Refuse the join.
    Reject,
}

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Tunables shared by every room. Durations are in milliseconds so the
/// struct maps directly onto a TOML table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Lobby length once the second player arrives.
    pub lobby_wait_ms: u64,

    /// First number of the pre-game countdown (counts down to 1).
    pub countdown_from: u32,

    /// Gap between countdown numbers, and between `1` and game start.
    pub countdown_interval_ms: u64,

    /// Gap between `lobby_timer_update` ticks while the lobby is open.
    /// Zero turns the ticks off.
    pub lobby_tick_interval_ms: u64,

    /// Lower bound for a client-requested lobby length.
    pub min_lobby_wait_ms: u64,

    /// Upper bound for a client-requested lobby length.
    pub max_lobby_wait_ms: u64,

    /// Number of distinct spawn locations per room.
    pub spawn_slots: usize,

    pub spawn_exhaustion: SpawnExhaustion,

    /// Maximum members per room.
    pub max_players: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            lobby_wait_ms: 20_000,
            countdown_from: 3,
            countdown_interval_ms: 1_000,
            lobby_tick_interval_ms: 1_000,
            min_lobby_wait_ms: 1_000,
            max_lobby_wait_ms: 300_000,
            spawn_slots: 20,
            spawn_exhaustion: SpawnExhaustion::default(),
            max_players: 20,
        }
    }
}

impl RoomConfig {
    pub fn lobby_wait(&self) -> Duration {
        Duration::from_millis(self.lobby_wait_ms)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_millis(self.countdown_interval_ms)
    }

    pub fn lobby_tick_interval(&self) -> Option<Duration> {
        (self.lobby_tick_interval_ms > 0).then(|| Duration::from_millis(self.lobby_tick_interval_ms))
    }

    /// Lobby length for an explicit `create_lobby`, falling back to the
    /// default and clamped to the configured bounds.
    pub fn requested_wait(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms.unwrap_or(self.lobby_wait_ms);
        let lo = self.min_lobby_wait_ms.min(self.max_lobby_wait_ms);
        Duration::from_millis(ms.clamp(lo, self.max_lobby_wait_ms))
    }
}

// ---------------------------------------------------------------------------
// RoomPhase
// ---------------------------------------------------------------------------

/// The lifecycle phase of a room.
///
/// Phases only move forward:
///
/// ```text
/// Waiting → Lobby → Countdown → Active
/// ```
///
/// - **Waiting**: a lone player; no timer runs.
/// - **Lobby**: two or more players; a single wait deadline is armed.
/// - **Countdown**: 3, 2, 1 at one-second intervals.
/// - **Active**: the game is running. Terminal for the life of the room.
///
/// A force start may jump straight from `Waiting` or `Lobby` to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoomPhase {
    Waiting,
    Lobby,
    Countdown,
    Active,
}

impl RoomPhase {
    /// The phase that normally follows this one.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Lobby),
            Self::Lobby => Some(Self::Countdown),
            Self::Countdown => Some(Self::Active),
            Self::Active => None,
        }
    }

    /// `true` if moving to `target` keeps the phase monotonic.
    pub fn can_advance_to(self, target: Self) -> bool {
        target > self
    }

    pub fn is_started(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Lobby => write!(f, "Lobby"),
            Self::Countdown => write!(f, "Countdown"),
            Self::Active => write!(f, "Active"),
        }
    }
}
