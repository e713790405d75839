//! The coordinator: every inbound event is resolved here.
//!
//! One [`Coordinator`] owns the session registry, the rooms, each
//! connection's outbox and the combat RNG. The server keeps it behind a
//! single lock, and every handler finishes its state change *and* pushes
//! the resulting events onto the outboxes before returning, so peers never
//! observe a half-applied change.
//!
//! Handlers never fail. Messages that reference something that no longer
//! exists (a session that raced a disconnect, a target in another room)
//! are dropped with a trace log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use aetherion_protocol::client::{
    CreateLobby, EffectApplied, EnemyDamaged, EnemyKilled, EnemyRespawned, JoinRoom,
    PlayerAnimation, PlayerAttack, PlayerDamaged, PlayerHealed, PlayerRespawn, PlayerSkill,
    PlayerUpdate, ProjectileSpawned, RoomRef, VisualEffect,
};
use aetherion_protocol::server::{
    AnimationChanged, AttackFailed, AttackPerformed, EffectRelayed, EffectSpawned,
    EnemyHealthChanged, EnemyDied, EnemyHit, EnemyReturned, ErrorNotice, GameCountdown,
    GameStart, Healed, HealthChanged, LobbyCreated, LobbyTimer, PlayerDied, PlayerLeft,
    PlayerMoved, PlayerRespawned, Pong, PositionCorrection, ProjectileLaunched, RoomPlayers,
    SkillUsed, TransformationEnded, Transformed,
};
use aetherion_protocol::{
    ClientEvent, ConnectionId, EntityRef, Recipient, RoomId, ServerEnvelope, ServerEvent,
    StatBlock, TargetType,
};
use aetherion_room::{PhaseEvent, RoomError, RoomManager};
use aetherion_session::{JoinInfo, SessionRegistry, SessionUpdate};
use aetherion_transport::ConnectIdentity;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedSender;

use crate::combat::{self, CharacterClass, Rolls};
use crate::config::ServerConfig;
use crate::movement;

/// Sending half of a connection's outbound queue.
pub type Outbox = UnboundedSender<Arc<ServerEnvelope>>;

/// Class assumed when a join does not name one. Deals neutral damage.
pub const DEFAULT_CHARACTER_CLASS: &str = "Unknown";

/// A stat lookup the caller should run outside the lock, then feed back
/// through [`Coordinator::apply_stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRequest {
    pub conn_id: ConnectionId,
    pub join_seq: u64,
    pub user_id: String,
    pub character_class: String,
}

struct Peer {
    identity: ConnectIdentity,
    outbox: Outbox,
}

pub struct Coordinator {
    config: ServerConfig,
    registry: SessionRegistry,
    rooms: RoomManager,
    peers: HashMap<ConnectionId, Peer>,
    rng: StdRng,
}

impl Coordinator {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Uses the given RNG for spawn fallback and combat rolls.
    pub fn with_rng(config: ServerConfig, rng: StdRng) -> Self {
        Self {
            rooms: RoomManager::new(config.room.clone()),
            config,
            registry: SessionRegistry::new(),
            peers: HashMap::new(),
            rng,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    // =====================================================================
    // Connection lifecycle
    // =====================================================================

    /// Registers a freshly accepted connection. It has no session until
    /// it sends `join_room`.
    pub fn connect(&mut self, conn_id: ConnectionId, identity: ConnectIdentity, outbox: Outbox) {
        tracing::debug!(%conn_id, guest = identity.is_guest(), "connection registered");
        self.peers.insert(conn_id, Peer { identity, outbox });
    }

    /// Tears down a connection. Safe to call more than once.
    ///
    /// The spawn slot and registry entry are released before the room is
    /// told, so `player_left` never races a stale roster.
    pub fn disconnect(&mut self, conn_id: ConnectionId) {
        let had_peer = self.peers.remove(&conn_id).is_some();
        self.leave_current_room(conn_id);
        if had_peer {
            tracing::info!(%conn_id, connections = self.peers.len(), "connection closed");
        }
    }

    fn leave_current_room(&mut self, conn_id: ConnectionId) {
        let Some(session) = self.registry.remove(conn_id) else {
            return;
        };
        let Some(departure) = self.rooms.leave(conn_id, session.spawn_index) else {
            return;
        };
        if !departure.room_closed {
            self.dispatch(
                Recipient::Room(departure.room_id),
                ServerEvent::PlayerLeft(PlayerLeft {
                    socket_id: conn_id,
                    username: session.username,
                }),
            );
        }
    }

    // =====================================================================
    // Inbound dispatch
    // =====================================================================

    /// Applies one inbound event. Returns a stat lookup to run when the
    /// event was a join by an account holder.
    pub fn handle(
        &mut self,
        conn_id: ConnectionId,
        event: ClientEvent,
        now: Instant,
    ) -> Option<StatsRequest> {
        if !self.peers.contains_key(&conn_id) {
            tracing::trace!(%conn_id, event = event.name(), "event from unknown connection");
            return None;
        }
        tracing::trace!(%conn_id, event = event.name(), "inbound");

        match event {
            ClientEvent::JoinRoom(join) => return self.on_join_room(conn_id, join, now),
            ClientEvent::GetRoomPlayers(req) => self.on_get_room_players(conn_id, req),
            ClientEvent::PlayerUpdate(update) => self.on_player_update(conn_id, update, now),
            ClientEvent::PlayerAnimation(anim) => self.on_player_animation(conn_id, anim),
            ClientEvent::PlayerAttack(attack) => self.on_player_attack(conn_id, attack),
            ClientEvent::PlayerDamaged(hit) => self.on_player_damaged(conn_id, hit),
            ClientEvent::PlayerRespawn(req) => self.on_player_respawn(conn_id, req, now),
            ClientEvent::EnemyDamaged(e) => self.on_enemy_damaged(conn_id, e),
            ClientEvent::EnemyKilled(e) => self.on_enemy_killed(conn_id, e),
            ClientEvent::EnemyRespawned(e) => self.on_enemy_respawned(conn_id, e),
            ClientEvent::PlayerSkill(skill) => self.on_player_skill(conn_id, skill),
            ClientEvent::PlayerTransformationEnd(_) => self.on_transformation_end(conn_id),
            ClientEvent::PlayerHealed(heal) => self.on_player_healed(conn_id, heal),
            ClientEvent::ProjectileSpawned(p) => self.on_projectile_spawned(conn_id, p),
            ClientEvent::EffectApplied(effect) => self.on_effect_applied(conn_id, effect),
            ClientEvent::VisualEffectSpawned(effect) => self.on_visual_effect(conn_id, effect),
            ClientEvent::StartGame(req) => self.on_start_game(conn_id, req, now),
            ClientEvent::CreateLobby(req) => self.on_create_lobby(conn_id, req, now),
            ClientEvent::Ping(_) => {
                self.dispatch(Recipient::Connection(conn_id), ServerEvent::Pong(Pong {}))
            }
        }
        None
    }

    /// Swaps in stats loaded from storage, if the session they were loaded
    /// for still exists.
    pub fn apply_stats(&mut self, conn_id: ConnectionId, join_seq: u64, stats: StatBlock) {
        let Some(session) = self.registry.get_mut(conn_id) else {
            tracing::trace!(%conn_id, "stats arrived after disconnect");
            return;
        };
        if session.join_seq != join_seq {
            tracing::trace!(%conn_id, "stats arrived for a previous join");
            return;
        }
        session.apply_stats(stats);
        tracing::debug!(%conn_id, max_health = session.max_health, "character stats applied");

        let room_id = session.room_id.clone();
        let event = ServerEvent::PlayerHealthChanged(HealthChanged {
            socket_id: conn_id,
            damage: 0.0,
            current_health: session.health,
            max_health: session.max_health,
            attacker_id: None,
        });
        self.dispatch(Recipient::Room(room_id), event);
    }

    /// Fires every due lobby and countdown deadline.
    pub fn advance_rooms(&mut self, now: Instant) {
        for (room_id, events) in self.rooms.advance_all(now) {
            for event in events {
                self.announce_phase(&room_id, event, Recipient::Room(room_id.clone()), false);
            }
        }
    }

    // =====================================================================
    // Room membership
    // =====================================================================

    fn on_join_room(
        &mut self,
        conn_id: ConnectionId,
        join: JoinRoom,
        now: Instant,
    ) -> Option<StatsRequest> {
        let identity = self.peers.get(&conn_id).map(|p| p.identity.clone()).unwrap_or_default();
        let room_id = join.room_id;
        let user_id = join.user_id.or(identity.user_id);
        let username = join
            .username
            .or(identity.username)
            .unwrap_or_else(|| format!("Player{}", conn_id.into_inner()));
        let character_class = join
            .character_class
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHARACTER_CLASS.to_string());

        // Switching rooms: leave the old one first.
        self.leave_current_room(conn_id);

        // One session per account per room: the newer connection wins.
        if let Some(uid) = &user_id {
            if let Some(stale) = self.registry.find_in_room_by_user(&room_id, uid) {
                tracing::info!(%room_id, old = %stale, new = %conn_id, "evicting older session for same user");
                self.disconnect(stale);
            }
        }

        let admission = match self.rooms.join(&room_id, conn_id, now, &mut self.rng) {
            Ok(admission) => admission,
            Err(RoomError::RoomFull(_)) => {
                tracing::warn!(%conn_id, %room_id, "join refused, room full");
                self.dispatch(
                    Recipient::Connection(conn_id),
                    ServerEvent::Error(ErrorNotice {
                        message: "room_full".to_string(),
                    }),
                );
                return None;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "join failed");
                return None;
            }
        };

        let info = JoinInfo {
            user_id: user_id.clone(),
            username,
            character_class: character_class.clone(),
            room_id: room_id.clone(),
            spawn_index: admission.slot.index,
            stats: StatBlock::baseline(),
        };
        let (join_seq, entry) = match self.registry.register(conn_id, info, now) {
            Ok(session) => (session.join_seq, session.roster_entry()),
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "session registration failed");
                self.rooms.leave(conn_id, admission.slot.index);
                return None;
            }
        };

        let (players, game_started) = match self.rooms.get(&room_id) {
            Some(room) => (self.registry.roster(room.members()), room.phase().is_started()),
            None => (Vec::new(), false),
        };
        self.dispatch(
            Recipient::Connection(conn_id),
            ServerEvent::RoomPlayers(RoomPlayers {
                room_id: room_id.clone(),
                players,
                your_socket_id: conn_id,
                your_spawn_index: admission.slot.index,
                game_started,
            }),
        );
        self.dispatch(
            Recipient::RoomExcept(room_id.clone(), conn_id),
            ServerEvent::PlayerJoined(entry),
        );

        if let Some(opened) = admission.opened {
            self.announce_phase(&room_id, opened, Recipient::Room(room_id.clone()), false);
        }
        if let Some(catch_up) = admission.catch_up {
            self.announce_phase(&room_id, catch_up, Recipient::Connection(conn_id), true);
        }

        user_id.map(|user_id| StatsRequest {
            conn_id,
            join_seq,
            user_id,
            character_class,
        })
    }

    fn on_get_room_players(&mut self, conn_id: ConnectionId, req: RoomRef) {
        let Some(session) = self.registry.get(conn_id) else {
            return;
        };
        let room_id = req.room_id.unwrap_or_else(|| session.room_id.clone());
        let your_spawn_index = session.spawn_index;
        let (players, game_started) = match self.rooms.get(&room_id) {
            Some(room) => (self.registry.roster(room.members()), room.phase().is_started()),
            None => (Vec::new(), false),
        };
        self.dispatch(
            Recipient::Connection(conn_id),
            ServerEvent::RoomPlayers(RoomPlayers {
                room_id,
                players,
                your_socket_id: conn_id,
                your_spawn_index,
                game_started,
            }),
        );
    }

    // =====================================================================
    // Movement
    // =====================================================================

    fn on_player_update(&mut self, conn_id: ConnectionId, update: PlayerUpdate, now: Instant) {
        if !(update.position.is_finite() && update.rotation.is_finite() && update.velocity.is_finite()) {
            tracing::debug!(%conn_id, "dropping player_update with non-finite values");
            return;
        }
        let Some(session) = self.registry.get(conn_id) else {
            return;
        };
        if !session.alive {
            tracing::trace!(%conn_id, "ignoring movement from dead player");
            return;
        }

        let verdict = if session.position_known {
            let elapsed = now.saturating_duration_since(session.last_update).as_secs_f32();
            movement::validate(
                &self.config.movement,
                session.position,
                update.position,
                elapsed,
                session.move_budget,
            )
        } else {
            movement::MovementVerdict::baseline(&self.config.movement, update.position)
        };
        let room_id = session.room_id.clone();

        self.registry.update(
            conn_id,
            SessionUpdate {
                position: Some(verdict.position),
                rotation: Some(update.rotation),
                velocity: Some(update.velocity),
                grounded: Some(update.is_grounded),
                last_update: Some(now),
                move_budget: Some(verdict.budget),
                ..Default::default()
            },
        );

        if let Some(reason) = verdict.reason {
            tracing::warn!(%conn_id, %reason, "movement corrected");
            self.dispatch(
                Recipient::Connection(conn_id),
                ServerEvent::PositionCorrection(PositionCorrection {
                    position: verdict.position,
                    reason: reason.to_string(),
                }),
            );
        }
        self.dispatch(
            Recipient::RoomExcept(room_id, conn_id),
            ServerEvent::PlayerMoved(PlayerMoved {
                socket_id: conn_id,
                position: verdict.position,
                rotation: update.rotation,
                velocity: update.velocity,
                is_grounded: update.is_grounded,
            }),
        );
    }

    fn on_player_animation(&mut self, conn_id: ConnectionId, anim: PlayerAnimation) {
        let Some(session) = self.registry.get(conn_id) else {
            return;
        };
        if !session.alive {
            return;
        }
        let room_id = session.room_id.clone();
        let speed = if anim.speed.is_finite() { anim.speed } else { 1.0 };
        self.registry.update(
            conn_id,
            SessionUpdate {
                animation: Some(anim.animation.clone()),
                animation_speed: Some(speed),
                ..Default::default()
            },
        );
        self.dispatch(
            Recipient::RoomExcept(room_id, conn_id),
            ServerEvent::PlayerAnimationChanged(AnimationChanged {
                socket_id: conn_id,
                animation: anim.animation,
                speed,
            }),
        );
    }

    // =====================================================================
    // Combat
    // =====================================================================

    fn on_player_attack(&mut self, conn_id: ConnectionId, attack: PlayerAttack) {
        let Some(attacker) = self.registry.get(conn_id) else {
            return;
        };
        if !attacker.alive {
            tracing::trace!(%conn_id, "dead players cannot attack");
            return;
        }
        let room_id = attacker.room_id.clone();
        let attacker_pos = attacker.position;
        let attacker_name = attacker.username.clone();
        let stats = attacker.stats;
        let class = CharacterClass::parse(&attacker.character_class);

        let (target_conn, target_pos) = match attack.target_type {
            TargetType::Player => {
                let Some(target) = attack.target_id.as_connection() else {
                    tracing::debug!(%conn_id, target = %attack.target_id, "player attack without a socket id");
                    return;
                };
                if target == conn_id {
                    tracing::debug!(%conn_id, "self-targeted attack dropped");
                    return;
                }
                match self.registry.get(target) {
                    Some(peer) if peer.room_id == room_id && peer.alive => (Some(target), peer.position),
                    _ => {
                        tracing::trace!(%conn_id, %target, "attack target unavailable");
                        return;
                    }
                }
            }
            TargetType::Enemy => match attack.target_position {
                Some(pos) if pos.is_finite() => (None, pos),
                _ => {
                    tracing::debug!(%conn_id, "enemy attack without a target position");
                    return;
                }
            },
        };

        if let Err(out) = combat::check_range(&self.config.combat, attack.attack_type, attacker_pos, target_pos) {
            tracing::debug!(
                %conn_id,
                attack_type = %attack.attack_type,
                distance = out.distance,
                max_range = out.max_range,
                "attack out of range"
            );
            self.dispatch(
                Recipient::Connection(conn_id),
                ServerEvent::AttackFailed(AttackFailed {
                    reason: "target_too_far".to_string(),
                    target_id: attack.target_id,
                    distance: out.distance,
                    max_range: out.max_range,
                }),
            );
            return;
        }

        let rolls = Rolls::roll(&self.config.combat, stats.luck, &mut self.rng);
        let damage = combat::compute_damage(&self.config.combat, &stats, class, attack.attack_type, rolls);

        match target_conn {
            Some(target) => self.damage_player(
                &room_id,
                target,
                damage.amount as f32,
                Some(EntityRef::Connection(conn_id)),
                Some(conn_id),
            ),
            None => {
                let enemy_id = attack.target_id.to_string();
                self.dispatch(
                    Recipient::Room(room_id.clone()),
                    ServerEvent::EnemyDamagedByServer(EnemyHit {
                        enemy_id,
                        damage: damage.amount,
                        is_critical: damage.critical,
                        attacker_socket_id: conn_id,
                        attacker_name,
                    }),
                );
            }
        }

        self.dispatch(
            Recipient::Room(room_id),
            ServerEvent::PlayerAttacked(AttackPerformed {
                socket_id: conn_id,
                attack_type: attack.attack_type,
                target_type: attack.target_type,
                target_id: attack.target_id,
                damage: damage.amount,
                is_critical: damage.critical,
                position: attack.position,
                direction: attack.direction,
            }),
        );
    }

    fn on_player_damaged(&mut self, conn_id: ConnectionId, hit: PlayerDamaged) {
        if !hit.damage.is_finite() || hit.damage < 0.0 {
            tracing::debug!(%conn_id, damage = hit.damage, "dropping invalid self-reported damage");
            return;
        }
        let Some(session) = self.registry.get(conn_id) else {
            return;
        };
        let room_id = session.room_id.clone();
        // The reported attacker is shown to clients but never credited.
        self.damage_player(&room_id, conn_id, hit.damage, hit.attacker_id, None);
    }

    /// Applies damage to a player and announces the result. Hits on a dead
    /// player change nothing and announce nothing.
    ///
    /// `attacker` is echoed in the broadcasts. Only `credit`, the sender
    /// of an attack the server resolved itself, gains a kill.
    fn damage_player(
        &mut self,
        room_id: &RoomId,
        target: ConnectionId,
        amount: f32,
        attacker: Option<EntityRef>,
        credit: Option<ConnectionId>,
    ) {
        let Some(session) = self.registry.get_mut(target) else {
            return;
        };
        let Some(outcome) = session.apply_damage(amount) else {
            tracing::trace!(%target, "hit on a dead player ignored");
            return;
        };
        let health = ServerEvent::PlayerHealthChanged(HealthChanged {
            socket_id: target,
            damage: outcome.applied,
            current_health: session.health,
            max_health: session.max_health,
            attacker_id: attacker.clone(),
        });
        self.dispatch(Recipient::Room(room_id.clone()), health);

        if !outcome.died {
            return;
        }
        if let Some(killer) = credit.filter(|k| *k != target) {
            if let Some(k) = self.registry.get_mut(killer).filter(|k| &k.room_id == room_id) {
                k.kills += 1;
            }
        }
        tracing::info!(%room_id, victim = %target, killer = ?attacker, "player died");
        self.dispatch(
            Recipient::Room(room_id.clone()),
            ServerEvent::PlayerDied(PlayerDied {
                socket_id: target,
                killer_id: attacker,
            }),
        );
    }

    fn on_player_respawn(&mut self, conn_id: ConnectionId, req: PlayerRespawn, now: Instant) {
        let position = req.position.filter(|p| p.is_finite());
        let Some(session) = self.registry.get_mut(conn_id) else {
            return;
        };
        if !session.respawn(position, now) {
            tracing::trace!(%conn_id, "respawn from a living player ignored");
            return;
        }
        session.move_budget = self.config.movement.burst_allowance();
        let room_id = session.room_id.clone();
        let event = ServerEvent::PlayerRespawned(PlayerRespawned {
            socket_id: conn_id,
            position: session.position,
            health: session.health,
            max_health: session.max_health,
        });
        self.dispatch(Recipient::Room(room_id), event);
    }

    // =====================================================================
    // NPC relays
    // =====================================================================

    /// The sender's room, provided a client-supplied room id agrees.
    fn relay_room(&self, conn_id: ConnectionId, claimed: Option<&RoomId>) -> Option<RoomId> {
        let session = self.registry.get(conn_id)?;
        match claimed {
            Some(claimed) if claimed != &session.room_id => {
                tracing::debug!(%conn_id, %claimed, actual = %session.room_id, "room id mismatch");
                None
            }
            _ => Some(session.room_id.clone()),
        }
    }

    fn on_enemy_damaged(&mut self, conn_id: ConnectionId, e: EnemyDamaged) {
        let Some(room_id) = self.relay_room(conn_id, e.room_id.as_ref()) else {
            return;
        };
        self.dispatch(
            Recipient::Room(room_id),
            ServerEvent::EnemyHealthChanged(EnemyHealthChanged {
                enemy_id: e.enemy_id,
                damage: e.damage,
                current_health: e.current_health,
                attacker_id: conn_id,
            }),
        );
    }

    fn on_enemy_killed(&mut self, conn_id: ConnectionId, e: EnemyKilled) {
        let Some(room_id) = self.relay_room(conn_id, e.room_id.as_ref()) else {
            return;
        };
        let killer_username = self
            .registry
            .get(conn_id)
            .map(|s| s.username.clone())
            .unwrap_or_default();
        self.dispatch(
            Recipient::Room(room_id),
            ServerEvent::EnemyDied(EnemyDied {
                enemy_id: e.enemy_id,
                killer_id: conn_id,
                killer_username,
                position: e.position,
            }),
        );
    }

    fn on_enemy_respawned(&mut self, conn_id: ConnectionId, e: EnemyRespawned) {
        let Some(room_id) = self.relay_room(conn_id, e.room_id.as_ref()) else {
            return;
        };
        self.dispatch(
            Recipient::Room(room_id),
            ServerEvent::EnemyRespawned(EnemyReturned {
                enemy_id: e.enemy_id,
                enemy_type: e.enemy_type,
                position: e.position,
                health: e.health,
            }),
        );
    }

    // =====================================================================
    // Skills and effects
    // =====================================================================

    fn on_player_skill(&mut self, conn_id: ConnectionId, skill: PlayerSkill) {
        let transformation = skill.is_transformation();
        let Some(session) = self.registry.get_mut(conn_id) else {
            return;
        };
        if !session.alive {
            return;
        }
        let room_id = session.room_id.clone();

        if transformation {
            session.transformed = true;
            session.transformation_skill_id = Some(skill.skill_id);
            self.dispatch(
                Recipient::Room(room_id),
                ServerEvent::PlayerTransformed(Transformed {
                    socket_id: conn_id,
                    skill_id: skill.skill_id,
                }),
            );
            return;
        }

        self.dispatch(
            Recipient::RoomExcept(room_id, conn_id),
            ServerEvent::PlayerSkillUsed(SkillUsed {
                socket_id: conn_id,
                skill_id: skill.skill_id,
                target_socket_id: skill.target_socket_id,
                target_position: skill.target_position,
                skill_type: skill.skill_type.unwrap_or_default(),
            }),
        );
    }

    fn on_transformation_end(&mut self, conn_id: ConnectionId) {
        let Some(session) = self.registry.get_mut(conn_id) else {
            return;
        };
        if !session.transformed {
            return;
        }
        session.transformed = false;
        session.transformation_skill_id = None;
        let room_id = session.room_id.clone();
        self.dispatch(
            Recipient::Room(room_id),
            ServerEvent::PlayerTransformationEnded(TransformationEnded { socket_id: conn_id }),
        );
    }

    fn on_visual_effect(&mut self, conn_id: ConnectionId, effect: VisualEffect) {
        if !effect.position.is_finite() {
            return;
        }
        let Some(session) = self.registry.get(conn_id) else {
            return;
        };
        let room_id = session.room_id.clone();
        let duration = if effect.duration.is_finite() && effect.duration > 0.0 {
            effect.duration
        } else {
            1.0
        };
        self.dispatch(
            Recipient::Room(room_id),
            ServerEvent::VisualEffectSpawned(EffectSpawned {
                socket_id: conn_id,
                effect_type: effect.effect_type,
                effect_prefab_name: effect.effect_prefab_name,
                position: effect.position,
                rotation: effect.rotation,
                target_socket_id: effect.target_socket_id,
                duration,
            }),
        );
    }

    /// Heals the sender or a room-mate. The result is computed from the
    /// server's health, never from figures the client sent.
    fn on_player_healed(&mut self, conn_id: ConnectionId, heal: PlayerHealed) {
        if !heal.heal_amount.is_finite() || heal.heal_amount < 0.0 {
            tracing::debug!(%conn_id, amount = heal.heal_amount, "dropping invalid heal");
            return;
        }
        let Some(healer) = self.registry.get(conn_id) else {
            return;
        };
        if !healer.alive {
            return;
        }
        let room_id = healer.room_id.clone();
        let healer_name = healer.username.clone();
        let target = heal.target_socket_id.unwrap_or(conn_id);

        let Some(session) = self.registry.get_mut(target).filter(|s| s.room_id == room_id) else {
            tracing::debug!(%conn_id, %target, "heal target is not in the healer's room");
            return;
        };
        let Some(restored) = session.heal(heal.heal_amount) else {
            tracing::trace!(%target, "heal on a dead player ignored");
            return;
        };
        let (current_health, max_health) = (session.health, session.max_health);

        self.dispatch(
            Recipient::Room(room_id.clone()),
            ServerEvent::PlayerHealthChanged(HealthChanged {
                socket_id: target,
                damage: 0.0,
                current_health,
                max_health,
                attacker_id: None,
            }),
        );
        self.dispatch(
            Recipient::Room(room_id),
            ServerEvent::PlayerHealed(Healed {
                target_socket_id: target,
                healer_socket_id: conn_id,
                healer_name,
                heal_amount: restored,
                current_health,
                max_health,
            }),
        );
    }

    fn on_projectile_spawned(&mut self, conn_id: ConnectionId, p: ProjectileSpawned) {
        if !(p.spawn_position.is_finite() && p.direction.is_finite()) {
            return;
        }
        let Some(session) = self.registry.get(conn_id) else {
            return;
        };
        if !session.alive {
            return;
        }
        let room_id = session.room_id.clone();
        self.dispatch(
            Recipient::RoomExcept(room_id, conn_id),
            ServerEvent::ProjectileSpawned(ProjectileLaunched {
                socket_id: conn_id,
                skill_id: p.skill_id,
                spawn_position: p.spawn_position,
                direction: p.direction,
                target_socket_id: p.target_socket_id,
            }),
        );
    }

    fn on_effect_applied(&mut self, conn_id: ConnectionId, effect: EffectApplied) {
        let Some(session) = self.registry.get(conn_id) else {
            return;
        };
        if !session.alive {
            return;
        }
        let room_id = session.room_id.clone();
        let target = effect.target_socket_id.unwrap_or(conn_id);
        if !self.registry.get(target).is_some_and(|t| t.room_id == room_id) {
            tracing::debug!(%conn_id, %target, "effect target is not in the caster's room");
            return;
        }
        let non_negative = |v: f32| if v.is_finite() { v.max(0.0) } else { 0.0 };
        self.dispatch(
            Recipient::RoomExcept(room_id, conn_id),
            ServerEvent::EffectApplied(EffectRelayed {
                caster_socket_id: conn_id,
                target_socket_id: target,
                effect_type: effect.effect_type,
                duration: non_negative(effect.duration),
                power: if effect.power.is_finite() { effect.power } else { 0.0 },
                tick_interval: non_negative(effect.tick_interval),
                particle_effect_prefab_name: effect.particle_effect_prefab_name,
            }),
        );
    }

    // =====================================================================
    // Lobby control
    // =====================================================================

    /// The room a lobby command applies to. The sender must be a member.
    fn command_room(&self, conn_id: ConnectionId, requested: Option<RoomId>) -> Option<RoomId> {
        let session = self.registry.get(conn_id)?;
        let room_id = requested.unwrap_or_else(|| session.room_id.clone());
        if room_id != session.room_id {
            tracing::debug!(%conn_id, %room_id, "lobby command for a room the sender is not in");
            return None;
        }
        Some(room_id)
    }

    fn on_start_game(&mut self, conn_id: ConnectionId, req: RoomRef, now: Instant) {
        let Some(room_id) = self.command_room(conn_id, req.room_id) else {
            return;
        };
        match self.rooms.force_start(&room_id, now) {
            Ok(Some(event)) => {
                self.announce_phase(&room_id, event, Recipient::Room(room_id.clone()), false)
            }
            Ok(None) => tracing::trace!(%room_id, "start_game on a running room"),
            Err(e) => tracing::debug!(error = %e, "start_game failed"),
        }
    }

    fn on_create_lobby(&mut self, conn_id: ConnectionId, req: CreateLobby, now: Instant) {
        let Some(room_id) = self.command_room(conn_id, req.room_id) else {
            return;
        };
        match self.rooms.open_lobby(&room_id, req.wait_time, now) {
            Ok(Some(event)) => {
                self.announce_phase(&room_id, event, Recipient::Room(room_id.clone()), false)
            }
            Ok(None) => tracing::trace!(%room_id, "create_lobby outside the waiting phase"),
            Err(e) => tracing::debug!(error = %e, "create_lobby failed"),
        }
    }

    /// Turns a phase event into its wire message and sends it.
    ///
    /// `catch_up` marks a private snapshot for a late joiner; for a
    /// started game it sets `alreadyStarted`.
    fn announce_phase(&self, room_id: &RoomId, event: PhaseEvent, to: Recipient, catch_up: bool) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        let message = match event {
            PhaseEvent::LobbyOpened { remaining } => ServerEvent::LobbyCreated(LobbyCreated {
                room_id: room_id.clone(),
                wait_time: remaining.as_millis() as u64,
                player_count: room.len(),
                max_players: room.max_players(),
            }),
            PhaseEvent::LobbyTick { remaining } => ServerEvent::LobbyTimerUpdate(LobbyTimer {
                room_id: room_id.clone(),
                time_remaining: remaining.as_millis().div_ceil(1000) as u64,
            }),
            PhaseEvent::Countdown(countdown) => ServerEvent::GameCountdown(GameCountdown {
                room_id: room_id.clone(),
                countdown,
            }),
            PhaseEvent::Started => ServerEvent::GameStart(GameStart {
                room_id: room_id.clone(),
                players: self.registry.roster(room.members()),
                already_started: catch_up,
            }),
        };
        if !catch_up && !matches!(event, PhaseEvent::LobbyTick { .. }) {
            tracing::info!(%room_id, ?event, players = room.len(), "room phase announced");
        }
        self.dispatch(to, message);
    }

    // =====================================================================
    // Fan-out
    // =====================================================================

    /// Stamps an event once and queues it for every recipient.
    fn dispatch(&self, to: Recipient, event: ServerEvent) {
        let envelope = Arc::new(ServerEnvelope::new(event));
        match to {
            Recipient::Connection(conn_id) => self.push(conn_id, &envelope),
            Recipient::Room(room_id) => self.push_room(&room_id, None, &envelope),
            Recipient::RoomExcept(room_id, skip) => self.push_room(&room_id, Some(skip), &envelope),
        }
    }

    fn push_room(&self, room_id: &RoomId, skip: Option<ConnectionId>, envelope: &Arc<ServerEnvelope>) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        for &member in room.members() {
            if Some(member) != skip {
                self.push(member, envelope);
            }
        }
    }

    fn push(&self, conn_id: ConnectionId, envelope: &Arc<ServerEnvelope>) {
        let Some(peer) = self.peers.get(&conn_id) else {
            return;
        };
        if peer.outbox.send(Arc::clone(envelope)).is_err() {
            tracing::trace!(%conn_id, "outbox closed, dropping event");
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("connections", &self.peers.len())
            .field("sessions", &self.registry.len())
            .field("rooms", &self.rooms.len())
            .finish()
    }
}
