//! The per-connection player record.

use std::time::Instant;

use aetherion_protocol::{ConnectionId, RoomId, RosterEntry, StatBlock, Vec3};

/// Animation tag set when a player dies.
pub const DEAD_ANIMATION: &str = "Dead";
/// Animation tag for a freshly joined or respawned player.
pub const IDLE_ANIMATION: &str = "Idle";

/// Everything needed to create a [`PlayerSession`].
#[derive(Debug, Clone)]
pub struct JoinInfo {
    pub user_id: Option<String>,
    pub username: String,
    pub character_class: String,
    pub room_id: RoomId,
    pub spawn_index: usize,
    /// Stat snapshot available at join time (usually the baseline; the
    /// real one arrives asynchronously).
    pub stats: StatBlock,
}

/// The server's authoritative, ephemeral record of one connected player.
///
/// Created on room join, destroyed on disconnect. Nothing here is ever
/// persisted; a reconnect starts from a fresh session.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub conn_id: ConnectionId,
    /// Registry-unique generation. Lets late async results (stat loads)
    /// detect that the session they were started for is gone.
    pub join_seq: u64,
    pub user_id: Option<String>,
    pub username: String,
    pub character_class: String,
    pub room_id: RoomId,

    pub position: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub grounded: bool,
    /// `false` until a movement update or respawn gives the server a
    /// baseline to validate later moves against.
    pub position_known: bool,
    pub last_update: Instant,
    /// Metres of movement allowance banked for bunched updates.
    pub move_budget: f32,

    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
    pub animation: String,
    pub animation_speed: f32,
    pub stats: StatBlock,

    pub transformed: bool,
    pub transformation_skill_id: Option<i64>,

    pub spawn_index: usize,
    pub kills: u32,
    pub deaths: u32,
}

/// Result of applying damage to a living session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    /// Health actually removed (never more than the health remaining).
    pub applied: f32,
    /// `true` exactly once: on the hit that took the player from alive
    /// to dead.
    pub died: bool,
}

impl PlayerSession {
    pub(crate) fn new(conn_id: ConnectionId, join_seq: u64, info: JoinInfo, now: Instant) -> Self {
        Self {
            conn_id,
            join_seq,
            user_id: info.user_id,
            username: info.username,
            character_class: info.character_class,
            room_id: info.room_id,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            velocity: Vec3::ZERO,
            grounded: true,
            position_known: false,
            last_update: now,
            move_budget: 0.0,
            health: StatBlock::BASELINE_MAX_HEALTH,
            max_health: StatBlock::BASELINE_MAX_HEALTH,
            alive: true,
            animation: IDLE_ANIMATION.to_string(),
            animation_speed: 1.0,
            stats: info.stats,
            transformed: false,
            transformation_skill_id: None,
            spawn_index: info.spawn_index,
            kills: 0,
            deaths: 0,
        }
    }

    /// Removes up to `amount` health.
    ///
    /// Returns `None` if the player is already dead, so a burst of lethal
    /// hits in the same tick kills (and counts a death) only once.
    pub fn apply_damage(&mut self, amount: f32) -> Option<DamageOutcome> {
        if !self.alive {
            return None;
        }
        let amount = amount.max(0.0);
        let before = self.health;
        self.health = (self.health - amount).max(0.0);

        let died = self.health <= 0.0;
        if died {
            self.alive = false;
            self.deaths += 1;
            self.animation = DEAD_ANIMATION.to_string();
            self.transformed = false;
            self.transformation_skill_id = None;
        }
        Some(DamageOutcome {
            applied: before - self.health,
            died,
        })
    }

    /// Restores up to `amount` health without passing the maximum.
    ///
    /// Returns the health actually restored, or `None` for a dead player:
    /// only a respawn brings someone back.
    pub fn heal(&mut self, amount: f32) -> Option<f32> {
        if !self.alive {
            return None;
        }
        let before = self.health;
        self.health = (self.health + amount.max(0.0)).min(self.max_health);
        Some(self.health - before)
    }

    /// Brings a dead player back at full health. Returns `false` (and
    /// changes nothing) if the player is alive.
    pub fn respawn(&mut self, position: Option<Vec3>, now: Instant) -> bool {
        if self.alive {
            return false;
        }
        self.alive = true;
        self.health = self.max_health;
        self.animation = IDLE_ANIMATION.to_string();
        match position {
            Some(p) => {
                self.position = p;
                self.position_known = true;
            }
            None => self.position_known = false,
        }
        self.velocity = Vec3::ZERO;
        self.last_update = now;
        true
    }

    /// Swaps in a stat snapshot loaded from storage.
    ///
    /// Max health is recomputed from endurance. A player at full health
    /// stays at full health; a damaged one keeps their health, clamped to
    /// the new maximum.
    pub fn apply_stats(&mut self, stats: StatBlock) {
        let was_full = self.health >= self.max_health;
        self.stats = stats;
        self.max_health = stats.max_health();
        if self.alive && was_full {
            self.health = self.max_health;
        } else {
            self.health = self.health.min(self.max_health);
        }
    }

    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            socket_id: self.conn_id,
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            character_class: self.character_class.clone(),
            spawn_index: self.spawn_index,
            position: self.position,
            rotation: self.rotation,
            health: self.health,
            max_health: self.max_health,
            is_alive: self.alive,
            animation: self.animation.clone(),
            kills: self.kills,
            deaths: self.deaths,
        }
    }
}

/// A partial update to a session. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub velocity: Option<Vec3>,
    pub grounded: Option<bool>,
    pub animation: Option<String>,
    pub animation_speed: Option<f32>,
    pub last_update: Option<Instant>,
    pub move_budget: Option<f32>,
}

impl SessionUpdate {
    pub(crate) fn apply(self, session: &mut PlayerSession) {
        if let Some(position) = self.position {
            session.position = position;
            session.position_known = true;
        }
        if let Some(rotation) = self.rotation {
            session.rotation = rotation;
        }
        if let Some(velocity) = self.velocity {
            session.velocity = velocity;
        }
        if let Some(grounded) = self.grounded {
            session.grounded = grounded;
        }
        if let Some(animation) = self.animation {
            session.animation = animation;
        }
        if let Some(speed) = self.animation_speed {
            session.animation_speed = speed;
        }
        if let Some(at) = self.last_update {
            session.last_update = at;
        }
        if let Some(budget) = self.move_budget {
            session.move_budget = budget;
        }
    }
}
