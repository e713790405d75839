//! Inbound events (client → server).
//!
//! Every frame is `{"event": "<name>", "data": ...}`. Some clients send
//! `data` as a string holding JSON instead of an object; the codec
//! unwraps that before matching against [`ClientEvent`], so the types
//! here only ever see structured data.

use aetherion_transport::ConnectionId;
use serde::{Deserialize, Serialize};

use crate::{AttackType, EntityRef, RoomId, TargetType, Vec3};

/// Every message a client may send, keyed by event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom(JoinRoom),
    GetRoomPlayers(RoomRef),
    PlayerUpdate(PlayerUpdate),
    PlayerAnimation(PlayerAnimation),
    PlayerAttack(PlayerAttack),
    PlayerDamaged(PlayerDamaged),
    PlayerRespawn(PlayerRespawn),
    EnemyDamaged(EnemyDamaged),
    EnemyKilled(EnemyKilled),
    EnemyRespawned(EnemyRespawned),
    PlayerSkill(PlayerSkill),
    PlayerTransformationEnd(Empty),
    PlayerHealed(PlayerHealed),
    ProjectileSpawned(ProjectileSpawned),
    EffectApplied(EffectApplied),
    VisualEffectSpawned(VisualEffect),
    StartGame(RoomRef),
    CreateLobby(CreateLobby),
    Ping(Empty),
}

impl ClientEvent {
    /// The wire name of this event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join_room",
            Self::GetRoomPlayers(_) => "get_room_players",
            Self::PlayerUpdate(_) => "player_update",
            Self::PlayerAnimation(_) => "player_animation",
            Self::PlayerAttack(_) => "player_attack",
            Self::PlayerDamaged(_) => "player_damaged",
            Self::PlayerRespawn(_) => "player_respawn",
            Self::EnemyDamaged(_) => "enemy_damaged",
            Self::EnemyKilled(_) => "enemy_killed",
            Self::EnemyRespawned(_) => "enemy_respawned",
            Self::PlayerSkill(_) => "player_skill",
            Self::PlayerTransformationEnd(_) => "player_transformation_end",
            Self::PlayerHealed(_) => "player_healed",
            Self::ProjectileSpawned(_) => "projectile_spawned",
            Self::EffectApplied(_) => "effect_applied",
            Self::VisualEffectSpawned(_) => "visual_effect_spawned",
            Self::StartGame(_) => "start_game",
            Self::CreateLobby(_) => "create_lobby",
            Self::Ping(_) => "ping",
        }
    }
}

/// Payload for events that carry no fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_id: RoomId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub character_class: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A payload that only names a room. The room is optional because the
/// sender's current room is used when it is omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    #[serde(default)]
    pub room_id: Option<RoomId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default)]
    pub velocity: Vec3,
    #[serde(default)]
    pub is_grounded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAnimation {
    pub animation: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_speed() -> f32 {
    1.0
}

/// An attack request. Note there is no damage field: damage is always
/// computed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAttack {
    pub target_type: TargetType,
    pub target_id: EntityRef,
    #[serde(default)]
    pub attack_type: AttackType,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub direction: Vec3,
    /// Required for NPC targets, whose positions the server does not track.
    #[serde(default)]
    pub target_position: Option<Vec3>,
}

/// Damage a client reports having taken from something the server does
/// not simulate (NPCs, environment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDamaged {
    pub damage: f32,
    #[serde(default)]
    pub current_health: Option<f32>,
    #[serde(default)]
    pub attacker_id: Option<EntityRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRespawn {
    #[serde(default)]
    pub position: Option<Vec3>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyDamaged {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub enemy_id: String,
    pub damage: f32,
    pub current_health: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyKilled {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub enemy_id: String,
    #[serde(default)]
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyRespawned {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub enemy_id: String,
    #[serde(default)]
    pub enemy_type: String,
    #[serde(default)]
    pub position: Vec3,
    pub health: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSkill {
    pub skill_id: i64,
    #[serde(default)]
    pub target_socket_id: Option<ConnectionId>,
    #[serde(default)]
    pub target_position: Option<Vec3>,
    /// `"transformation"` (any ASCII case) toggles the caster into a
    /// transformed state. Every other value is an ordinary skill.
    #[serde(default)]
    pub skill_type: Option<String>,
}

impl PlayerSkill {
    /// The one rule that marks a skill as a transformation: its
    /// `skillType` equals `"transformation"`, ignoring ASCII case.
    pub fn is_transformation(&self) -> bool {
        self.skill_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("transformation"))
    }
}

/// A heal the sender cast on themselves or a room-mate. The healer is
/// always the sender, and the resulting health is computed server-side,
/// so any health figures the client attaches are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerHealed {
    /// Defaults to the sender.
    #[serde(default)]
    pub target_socket_id: Option<ConnectionId>,
    pub heal_amount: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileSpawned {
    pub skill_id: i64,
    pub spawn_position: Vec3,
    #[serde(default)]
    pub direction: Vec3,
    #[serde(default)]
    pub target_socket_id: Option<ConnectionId>,
}

/// A buff or debuff. Effects are simulated by clients; the server only
/// relays them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectApplied {
    /// Defaults to the sender.
    #[serde(default)]
    pub target_socket_id: Option<ConnectionId>,
    pub effect_type: String,
    #[serde(default)]
    pub duration: f32,
    #[serde(default)]
    pub power: f32,
    #[serde(default)]
    pub tick_interval: f32,
    #[serde(default)]
    pub particle_effect_prefab_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualEffect {
    pub effect_type: String,
    #[serde(default)]
    pub effect_prefab_name: String,
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default)]
    pub target_socket_id: Option<ConnectionId>,
    #[serde(default = "default_effect_duration")]
    pub duration: f32,
}

fn default_effect_duration() -> f32 {
    1.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobby {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Lobby duration in milliseconds.
    #[serde(default)]
    pub wait_time: Option<u64>,
}
