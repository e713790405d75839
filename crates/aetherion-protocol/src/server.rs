//! Outbound events (server → client).
//!
//! Each event is wrapped in a [`ServerEnvelope`] that adds the server
//! timestamp, producing `{"event": "<name>", "data": {...}, "timestamp": N}`.

use aetherion_transport::ConnectionId;
use serde::Serialize;

use crate::types::now_millis;
use crate::{AttackType, EntityRef, RosterEntry, RoomId, TargetType, Vec3};

/// Every message the server may send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomPlayers(RoomPlayers),
    PlayerJoined(RosterEntry),
    PlayerLeft(PlayerLeft),
    PlayerMoved(PlayerMoved),
    PositionCorrection(PositionCorrection),
    PlayerAnimationChanged(AnimationChanged),
    PlayerAttacked(AttackPerformed),
    AttackFailed(AttackFailed),
    PlayerHealthChanged(HealthChanged),
    PlayerDied(PlayerDied),
    PlayerRespawned(PlayerRespawned),
    EnemyDamagedByServer(EnemyHit),
    EnemyHealthChanged(EnemyHealthChanged),
    EnemyDied(EnemyDied),
    EnemyRespawned(EnemyReturned),
    PlayerSkillUsed(SkillUsed),
    PlayerTransformed(Transformed),
    PlayerTransformationEnded(TransformationEnded),
    VisualEffectSpawned(EffectSpawned),
    PlayerHealed(Healed),
    ProjectileSpawned(ProjectileLaunched),
    EffectApplied(EffectRelayed),
    LobbyCreated(LobbyCreated),
    LobbyTimerUpdate(LobbyTimer),
    GameCountdown(GameCountdown),
    GameStart(GameStart),
    Pong(Pong),
    Error(ErrorNotice),
}

/// A [`ServerEvent`] stamped with the time it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEnvelope {
    #[serde(flatten)]
    pub event: ServerEvent,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: u64,
}

impl ServerEnvelope {
    /// Wraps an event, stamping it with the current wall-clock time.
    pub fn new(event: ServerEvent) -> Self {
        Self::at(event, now_millis())
    }

    pub fn at(event: ServerEvent, timestamp: u64) -> Self {
        Self { event, timestamp }
    }
}

// ---------------------------------------------------------------------------
// Roster and membership
// ---------------------------------------------------------------------------

/// Private reply to a join or a roster request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayers {
    pub room_id: RoomId,
    pub players: Vec<RosterEntry>,
    pub your_socket_id: ConnectionId,
    pub your_spawn_index: usize,
    pub game_started: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeft {
    pub socket_id: ConnectionId,
    pub username: String,
}

// ---------------------------------------------------------------------------
// Movement and animation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMoved {
    pub socket_id: ConnectionId,
    pub position: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub is_grounded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionCorrection {
    pub position: Vec3,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationChanged {
    pub socket_id: ConnectionId,
    pub animation: String,
    pub speed: f32,
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

/// Broadcast for every resolved attack so clients can play the swing,
/// projectile or spell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackPerformed {
    pub socket_id: ConnectionId,
    pub attack_type: AttackType,
    pub target_type: TargetType,
    pub target_id: EntityRef,
    pub damage: u32,
    pub is_critical: bool,
    pub position: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackFailed {
    pub reason: String,
    pub target_id: EntityRef,
    pub distance: f32,
    pub max_range: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChanged {
    pub socket_id: ConnectionId,
    pub damage: f32,
    pub current_health: f32,
    pub max_health: f32,
    pub attacker_id: Option<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDied {
    pub socket_id: ConnectionId,
    pub killer_id: Option<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRespawned {
    pub socket_id: ConnectionId,
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
}

// ---------------------------------------------------------------------------
// NPCs
// ---------------------------------------------------------------------------

/// Server-computed damage against an NPC. Clients apply it locally since
/// NPC health is not tracked here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyHit {
    pub enemy_id: String,
    pub damage: u32,
    pub is_critical: bool,
    pub attacker_socket_id: ConnectionId,
    pub attacker_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyHealthChanged {
    pub enemy_id: String,
    pub damage: f32,
    pub current_health: f32,
    pub attacker_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyDied {
    pub enemy_id: String,
    pub killer_id: ConnectionId,
    pub killer_username: String,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyReturned {
    pub enemy_id: String,
    pub enemy_type: String,
    pub position: Vec3,
    pub health: f32,
}

// ---------------------------------------------------------------------------
// Skills and effects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillUsed {
    pub socket_id: ConnectionId,
    pub skill_id: i64,
    pub target_socket_id: Option<ConnectionId>,
    pub target_position: Option<Vec3>,
    pub skill_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformed {
    pub socket_id: ConnectionId,
    pub skill_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationEnded {
    pub socket_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectSpawned {
    pub socket_id: ConnectionId,
    pub effect_type: String,
    pub effect_prefab_name: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub target_socket_id: Option<ConnectionId>,
    pub duration: f32,
}

/// A heal, after the server capped it at the target's max health.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Healed {
    pub target_socket_id: ConnectionId,
    pub healer_socket_id: ConnectionId,
    pub healer_name: String,
    /// Health actually restored.
    pub heal_amount: f32,
    pub current_health: f32,
    pub max_health: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileLaunched {
    pub socket_id: ConnectionId,
    pub skill_id: i64,
    pub spawn_position: Vec3,
    pub direction: Vec3,
    pub target_socket_id: Option<ConnectionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectRelayed {
    pub caster_socket_id: ConnectionId,
    pub target_socket_id: ConnectionId,
    pub effect_type: String,
    pub duration: f32,
    pub power: f32,
    pub tick_interval: f32,
    pub particle_effect_prefab_name: String,
}

// ---------------------------------------------------------------------------
// Lobby lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyCreated {
    pub room_id: RoomId,
    /// Milliseconds until the countdown begins.
    pub wait_time: u64,
    pub player_count: usize,
    pub max_players: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyTimer {
    pub room_id: RoomId,
    /// Whole seconds until the countdown begins, rounded up.
    pub time_remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCountdown {
    pub room_id: RoomId,
    pub countdown: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStart {
    pub room_id: RoomId,
    pub players: Vec<RosterEntry>,
    /// `true` when sent privately to someone joining a running game.
    pub already_started: bool,
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Pong {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorNotice {
    pub message: String,
}
