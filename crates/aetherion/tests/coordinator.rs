//! End-to-end flows through the coordinator, observed on each
//! connection's outbox. Time is synthetic and the RNG is seeded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aetherion::ServerConfig;
use aetherion::coordinator::Coordinator;
use aetherion_protocol::client::{
    CreateLobby, EffectApplied, Empty, EnemyDamaged, JoinRoom, PlayerAnimation, PlayerAttack,
    PlayerDamaged, PlayerHealed, PlayerRespawn, PlayerSkill, PlayerUpdate, ProjectileSpawned,
    RoomRef, VisualEffect,
};
use aetherion_protocol::{
    AttackType, ClientEvent, ConnectionId, EntityRef, RoomId, ServerEnvelope, ServerEvent,
    StatBlock, TargetType, Vec3,
};
use aetherion_room::RoomConfig;
use aetherion_transport::ConnectIdentity;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::{self, UnboundedReceiver, error::TryRecvError};

// =========================================================================
// Harness
// =========================================================================

struct Client {
    id: ConnectionId,
    rx: UnboundedReceiver<Arc<ServerEnvelope>>,
}

impl Client {
    /// Everything queued so far.
    fn events(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            out.push(envelope.event.clone());
        }
        out
    }

    fn is_closed(&mut self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

struct Arena {
    coord: Coordinator,
    t0: Instant,
    next_id: u64,
}

impl Arena {
    fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    fn with_config(config: ServerConfig) -> Self {
        Self {
            coord: Coordinator::with_rng(config, StdRng::seed_from_u64(7)),
            t0: Instant::now(),
            next_id: 1,
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn connect(&mut self) -> Client {
        self.connect_as(ConnectIdentity::default())
    }

    fn connect_as(&mut self, identity: ConnectIdentity) -> Client {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.coord.connect(id, identity, tx);
        Client { id, rx }
    }

    fn send(&mut self, client: &Client, event: ClientEvent, ms: u64) {
        let now = self.at(ms);
        self.coord.handle(client.id, event, now);
    }

    fn join(&mut self, client: &Client, room: &str, ms: u64) {
        self.send(client, join_event(room, &format!("p{}", client.id.into_inner()), None), ms);
    }

    fn move_to(&mut self, client: &Client, position: Vec3, ms: u64) {
        self.send(
            client,
            ClientEvent::PlayerUpdate(PlayerUpdate {
                position,
                rotation: Vec3::ZERO,
                velocity: Vec3::ZERO,
                is_grounded: true,
            }),
            ms,
        );
    }

    fn health(&self, client: &Client) -> f32 {
        self.coord.registry().get(client.id).map_or(-1.0, |s| s.health)
    }
}

fn join_event(room: &str, username: &str, user_id: Option<&str>) -> ClientEvent {
    ClientEvent::JoinRoom(JoinRoom {
        room_id: RoomId::new(room),
        username: Some(username.to_string()),
        character_class: Some("Warrior".to_string()),
        user_id: user_id.map(str::to_string),
    })
}

fn melee(target: &Client) -> ClientEvent {
    ClientEvent::PlayerAttack(PlayerAttack {
        target_type: TargetType::Player,
        target_id: EntityRef::Connection(target.id),
        attack_type: AttackType::Melee,
        position: Vec3::ZERO,
        direction: Vec3::new(1.0, 0.0, 0.0),
        target_position: None,
    })
}

// =========================================================================
// Joining and the lobby
// =========================================================================

#[test]
fn test_first_join_gets_private_roster() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);

    let events = a.events();
    assert_eq!(events.len(), 1, "{events:?}");
    let ServerEvent::RoomPlayers(roster) = &events[0] else {
        panic!("expected room_players, got {events:?}");
    };
    assert_eq!(roster.your_socket_id, a.id);
    assert_eq!(roster.your_spawn_index, 0);
    assert_eq!(roster.players.len(), 1);
    assert!(!roster.game_started);
}

#[test]
fn test_second_join_opens_lobby_for_everyone() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    a.events();
    arena.join(&b, "r1", 100);

    let a_events = a.events();
    assert!(matches!(&a_events[0], ServerEvent::PlayerJoined(p) if p.socket_id == b.id && p.spawn_index == 1));
    assert!(matches!(
        &a_events[1],
        ServerEvent::LobbyCreated(l) if l.wait_time == 20_000 && l.player_count == 2 && l.max_players == 20
    ));

    let b_events = b.events();
    assert!(matches!(&b_events[0], ServerEvent::RoomPlayers(r) if r.players.len() == 2));
    assert!(matches!(&b_events[1], ServerEvent::LobbyCreated(_)));
    assert_eq!(b_events.len(), 2, "no catch-up for the player who opened the lobby");
}

#[test]
fn test_third_joiner_sees_remaining_wait() {
    let mut arena = Arena::new();
    let a = arena.connect();
    let b = arena.connect();
    let mut c = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    arena.join(&c, "r1", 8_000);

    let events = c.events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ServerEvent::LobbyCreated(l) if l.wait_time == 12_000)),
        "{events:?}"
    );
}

#[test]
fn test_countdown_then_start() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    a.events();

    arena.coord.advance_rooms(arena.at(19_999));
    assert!(matches!(
        &a.events()[..],
        [ServerEvent::LobbyTimerUpdate(t)] if t.time_remaining == 1
    ));

    let mut seen = Vec::new();
    for ms in [20_000, 21_000, 22_000, 23_000] {
        arena.coord.advance_rooms(arena.at(ms));
        seen.extend(a.events());
    }
    let countdowns: Vec<u32> = seen
        .iter()
        .filter_map(|e| match e {
            ServerEvent::GameCountdown(c) => Some(c.countdown),
            _ => None,
        })
        .collect();
    assert_eq!(countdowns, vec![3, 2, 1]);
    assert!(matches!(
        seen.last(),
        Some(ServerEvent::GameStart(g)) if g.players.len() == 2 && !g.already_started
    ));
}

#[test]
fn test_open_lobby_ticks_once_per_second() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    a.events();
    b.events();

    arena.coord.advance_rooms(arena.at(1_000));
    assert!(matches!(
        &a.events()[..],
        [ServerEvent::LobbyTimerUpdate(t)] if t.time_remaining == 19 && t.room_id == RoomId::new("r1")
    ));
    assert!(matches!(&b.events()[..], [ServerEvent::LobbyTimerUpdate(_)]));

    arena.coord.advance_rooms(arena.at(1_500));
    assert!(a.events().is_empty());

    arena.coord.advance_rooms(arena.at(2_000));
    assert!(matches!(
        &a.events()[..],
        [ServerEvent::LobbyTimerUpdate(t)] if t.time_remaining == 18
    ));
}

#[test]
fn test_lone_player_gets_no_lobby_ticks() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    a.events();
    arena.coord.advance_rooms(arena.at(5_000));
    assert!(a.events().is_empty());
}

#[test]
fn test_late_joiner_to_active_room_gets_full_roster() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.send(&a, ClientEvent::StartGame(RoomRef::default()), 10);
    assert!(a.events().iter().any(|e| matches!(e, ServerEvent::GameStart(_))));

    arena.join(&b, "r1", 500);
    let events = b.events();
    assert!(matches!(&events[0], ServerEvent::RoomPlayers(r) if r.game_started));
    assert!(matches!(
        events.last(),
        Some(ServerEvent::GameStart(g)) if g.already_started && g.players.len() == 2
    ));
}

#[test]
fn test_create_lobby_uses_requested_wait() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    a.events();

    arena.send(
        &a,
        ClientEvent::CreateLobby(CreateLobby {
            room_id: None,
            wait_time: Some(5_000),
        }),
        0,
    );
    assert!(matches!(&a.events()[..], [ServerEvent::LobbyCreated(l)] if l.wait_time == 5_000));

    arena.coord.advance_rooms(arena.at(5_000));
    assert!(matches!(&a.events()[..], [ServerEvent::GameCountdown(c)] if c.countdown == 3));
}

#[test]
fn test_lobby_command_for_foreign_room_is_ignored() {
    let mut arena = Arena::new();
    let a = arena.connect();
    let b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r2", 0);
    arena.send(
        &a,
        ClientEvent::StartGame(RoomRef {
            room_id: Some(RoomId::new("r2")),
        }),
        0,
    );
    let r2 = arena.coord.rooms().get(&RoomId::new("r2")).unwrap();
    assert!(!r2.phase().is_started());
}

#[test]
fn test_full_room_replies_with_error() {
    let mut arena = Arena::with_config(ServerConfig {
        room: RoomConfig {
            max_players: 1,
            ..RoomConfig::default()
        },
        ..ServerConfig::default()
    });
    let a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);

    assert!(matches!(&b.events()[..], [ServerEvent::Error(e)] if e.message == "room_full"));
    assert!(arena.coord.registry().get(b.id).is_none());
}

// =========================================================================
// Leaving
// =========================================================================

#[test]
fn test_disconnect_frees_slot_and_notifies_room() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    a.events();

    arena.coord.disconnect(b.id);
    assert!(matches!(&a.events()[..], [ServerEvent::PlayerLeft(l)] if l.socket_id == b.id));
    assert!(arena.coord.registry().get(b.id).is_none());
    let room = arena.coord.rooms().get(&RoomId::new("r1")).unwrap();
    assert!(!room.spawns().is_held(1));

    // Disconnect is idempotent.
    arena.coord.disconnect(b.id);
    assert!(a.events().is_empty());

    let mut c = arena.connect();
    arena.join(&c, "r1", 0);
    assert!(matches!(&c.events()[0], ServerEvent::RoomPlayers(r) if r.your_spawn_index == 1));
}

#[test]
fn test_last_disconnect_destroys_room() {
    let mut arena = Arena::new();
    let a = arena.connect();
    arena.join(&a, "r1", 0);
    arena.coord.disconnect(a.id);
    assert!(arena.coord.rooms().is_empty());
    assert!(arena.coord.registry().is_empty());
}

#[test]
fn test_switching_rooms_leaves_the_old_one() {
    let mut arena = Arena::new();
    let a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    b.events();

    arena.join(&a, "r2", 100);
    assert!(b.events().iter().any(|e| matches!(e, ServerEvent::PlayerLeft(l) if l.socket_id == a.id)));
    assert_eq!(arena.coord.rooms().room_of(a.id), Some(&RoomId::new("r2")));
    assert_eq!(arena.coord.registry().get(a.id).unwrap().room_id, RoomId::new("r2"));
}

#[test]
fn test_same_account_evicts_older_session() {
    let mut arena = Arena::new();
    let mut old = arena.connect();
    let new = arena.connect();
    arena.send(&old, join_event("r1", "ayla", Some("u1")), 0);
    old.events();

    arena.send(&new, join_event("r1", "ayla", Some("u1")), 10);
    assert!(arena.coord.registry().get(old.id).is_none());
    assert!(arena.coord.registry().get(new.id).is_some());
    assert!(old.is_closed(), "evicted connection's outbox must be dropped");
    assert_eq!(arena.coord.connection_count(), 1);
}

// =========================================================================
// Movement
// =========================================================================

#[test]
fn test_teleport_is_blocked_and_peers_see_server_position() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    arena.move_to(&a, Vec3::ZERO, 0);
    a.events();
    b.events();

    arena.move_to(&a, Vec3::new(100.0, 0.0, 0.0), 50);
    assert!(matches!(
        &a.events()[..],
        [ServerEvent::PositionCorrection(c)] if c.reason == "teleport_blocked" && c.position == Vec3::ZERO
    ));
    assert!(matches!(
        &b.events()[..],
        [ServerEvent::PlayerMoved(m)] if m.socket_id == a.id && m.position == Vec3::ZERO
    ));
}

#[test]
fn test_small_step_is_accepted_without_correction() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    arena.move_to(&a, Vec3::ZERO, 0);
    arena.move_to(&a, Vec3::new(0.5, 0.0, 0.0), 50);

    assert!(a.events().iter().all(|e| !matches!(e, ServerEvent::PositionCorrection(_))));
    assert_eq!(
        arena.coord.registry().get(a.id).unwrap().position,
        Vec3::new(0.5, 0.0, 0.0)
    );
}

#[test]
fn test_bunched_arrivals_of_legal_steps_are_not_corrected() {
    // 1.4 m per 100 ms is 14 m/s, under the limit, but the network
    // delivers the first two frames 1 ms apart.
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    arena.move_to(&a, Vec3::ZERO, 0);
    arena.move_to(&a, Vec3::new(1.4, 0.0, 0.0), 100);
    arena.move_to(&a, Vec3::new(2.8, 0.0, 0.0), 101);
    arena.move_to(&a, Vec3::new(4.2, 0.0, 0.0), 300);

    let events = a.events();
    assert!(
        events.iter().all(|e| !matches!(e, ServerEvent::PositionCorrection(_))),
        "{events:?}"
    );
    assert_eq!(
        arena.coord.registry().get(a.id).unwrap().position,
        Vec3::new(4.2, 0.0, 0.0)
    );
    let last_seen = b
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::PlayerMoved(m) => Some(m.position),
            _ => None,
        })
        .last();
    assert_eq!(last_seen, Some(Vec3::new(4.2, 0.0, 0.0)));
}

#[test]
fn test_sustained_overspeed_is_corrected() {
    // 3 m per 100 ms is 30 m/s. The banked allowance runs out and the
    // speed limit kicks in.
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    arena.move_to(&a, Vec3::ZERO, 0);
    a.events();

    for step in 1..=10u64 {
        arena.move_to(&a, Vec3::new(3.0 * step as f32, 0.0, 0.0), step * 100);
    }
    let corrections = a
        .events()
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::PositionCorrection(c) if c.reason == "speed_limit"))
        .count();
    assert!(corrections > 0);
    let x = arena.coord.registry().get(a.id).unwrap().position.x;
    assert!(x < 30.0, "server position {x} should lag the reported 30 m");
}

#[test]
fn test_non_finite_update_is_dropped() {
    let mut arena = Arena::new();
    let a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    b.events();
    arena.move_to(&a, Vec3::new(f32::NAN, 0.0, 0.0), 10);
    assert!(b.events().is_empty());
}

// =========================================================================
// Combat
// =========================================================================

#[test]
fn test_melee_out_of_range_fails_privately() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    arena.move_to(&a, Vec3::ZERO, 0);
    arena.move_to(&b, Vec3::new(5.0, 0.0, 0.0), 0);
    a.events();
    b.events();

    arena.send(&a, melee(&b), 100);
    assert!(matches!(
        &a.events()[..],
        [ServerEvent::AttackFailed(f)] if f.reason == "target_too_far" && f.max_range == 3.0
    ));
    assert!(b.events().is_empty());
    assert_eq!(arena.health(&b), 100.0);
}

#[test]
fn test_melee_in_range_damages_and_kills_once() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    arena.move_to(&a, Vec3::ZERO, 0);
    arena.move_to(&b, Vec3::new(1.0, 0.0, 0.0), 0);
    a.events();
    b.events();

    arena.send(&a, melee(&b), 100);
    let events = b.events();
    assert!(events.iter().any(|e| matches!(e, ServerEvent::PlayerHealthChanged(h) if h.socket_id == b.id)));
    assert!(events.iter().any(|e| matches!(e, ServerEvent::PlayerAttacked(p) if p.socket_id == a.id)));
    assert!(arena.health(&b) < 100.0);

    for i in 0..20 {
        arena.send(&a, melee(&b), 200 + i * 100);
    }
    let deaths = b
        .events()
        .iter()
        .filter(|e| matches!(e, ServerEvent::PlayerDied(d) if d.socket_id == b.id))
        .count();
    assert_eq!(deaths, 1);

    let victim = arena.coord.registry().get(b.id).unwrap();
    assert!(!victim.alive);
    assert_eq!(victim.health, 0.0);
    assert_eq!(victim.deaths, 1);
    assert_eq!(victim.animation, "Dead");
    assert_eq!(arena.coord.registry().get(a.id).unwrap().kills, 1);
}

#[test]
fn test_self_reported_lethal_damage_is_idempotent() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    a.events();

    let lethal = ClientEvent::PlayerDamaged(PlayerDamaged {
        damage: 500.0,
        current_health: Some(0.0),
        attacker_id: Some(EntityRef::Named("lava".into())),
    });
    arena.send(&a, lethal.clone(), 10);
    arena.send(&a, lethal, 11);

    let events = a.events();
    assert_eq!(events.len(), 2, "{events:?}");
    assert!(matches!(&events[0], ServerEvent::PlayerHealthChanged(h) if h.current_health == 0.0 && h.damage == 100.0));
    assert!(matches!(&events[1], ServerEvent::PlayerDied(_)));
    assert_eq!(arena.coord.registry().get(a.id).unwrap().deaths, 1);
}

#[test]
fn test_reported_attacker_is_not_credited_with_a_kill() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let friend = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&friend, "r1", 0);
    a.events();

    arena.send(
        &a,
        ClientEvent::PlayerDamaged(PlayerDamaged {
            damage: 1_000.0,
            current_health: None,
            attacker_id: Some(EntityRef::Connection(friend.id)),
        }),
        10,
    );

    let events = a.events();
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::PlayerDied(d) if d.socket_id == a.id && d.killer_id == Some(EntityRef::Connection(friend.id))
    )));
    assert_eq!(arena.coord.registry().get(a.id).unwrap().deaths, 1);
    assert_eq!(arena.coord.registry().get(friend.id).unwrap().kills, 0);
}

#[test]
fn test_respawn_only_when_dead() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    a.events();

    let respawn = ClientEvent::PlayerRespawn(PlayerRespawn {
        position: Some(Vec3::new(2.0, 0.0, 2.0)),
    });
    arena.send(&a, respawn.clone(), 10);
    assert!(a.events().is_empty());

    arena.send(
        &a,
        ClientEvent::PlayerDamaged(PlayerDamaged {
            damage: 1_000.0,
            current_health: None,
            attacker_id: None,
        }),
        20,
    );
    a.events();
    arena.send(&a, respawn, 30);
    assert!(matches!(
        &a.events()[..],
        [ServerEvent::PlayerRespawned(r)] if r.health == 100.0 && r.position == Vec3::new(2.0, 0.0, 2.0)
    ));
    let session = arena.coord.registry().get(a.id).unwrap();
    assert!(session.alive);
    assert_eq!(session.animation, "Idle");
}

#[test]
fn test_dead_player_cannot_attack() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    arena.send(
        &a,
        ClientEvent::PlayerDamaged(PlayerDamaged {
            damage: 1_000.0,
            current_health: None,
            attacker_id: None,
        }),
        0,
    );
    a.events();
    arena.send(&a, melee(&b), 10);
    assert!(a.events().is_empty());
    assert_eq!(arena.health(&b), 100.0);
}

#[test]
fn test_enemy_attack_is_resolved_by_server() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    arena.move_to(&a, Vec3::ZERO, 0);
    a.events();

    arena.send(
        &a,
        ClientEvent::PlayerAttack(PlayerAttack {
            target_type: TargetType::Enemy,
            target_id: EntityRef::Named("goblin-3".into()),
            attack_type: AttackType::Ranged,
            position: Vec3::ZERO,
            direction: Vec3::new(0.0, 0.0, 1.0),
            target_position: Some(Vec3::new(0.0, 0.0, 20.0)),
        }),
        10,
    );
    let events = a.events();
    assert!(matches!(&events[0], ServerEvent::EnemyDamagedByServer(h) if h.enemy_id == "goblin-3" && h.damage > 0));
    assert!(matches!(&events[1], ServerEvent::PlayerAttacked(_)));
}

// =========================================================================
// Relays, skills, misc
// =========================================================================

#[test]
fn test_enemy_relay_ignores_mismatched_room() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    a.events();

    let hit = |room: &str| {
        ClientEvent::EnemyDamaged(EnemyDamaged {
            room_id: Some(RoomId::new(room)),
            enemy_id: "orc".into(),
            damage: 5.0,
            current_health: 45.0,
        })
    };
    arena.send(&a, hit("elsewhere"), 10);
    assert!(a.events().is_empty());
    arena.send(&a, hit("r1"), 20);
    assert!(matches!(&a.events()[..], [ServerEvent::EnemyHealthChanged(e)] if e.attacker_id == a.id));
}

#[test]
fn test_transformation_reaches_sender_and_ordinary_skill_does_not() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    a.events();
    b.events();

    arena.send(
        &a,
        ClientEvent::PlayerSkill(PlayerSkill {
            skill_id: 7,
            target_socket_id: None,
            target_position: None,
            skill_type: Some("Transformation".into()),
        }),
        10,
    );
    assert!(matches!(&a.events()[..], [ServerEvent::PlayerTransformed(t)] if t.skill_id == 7));
    assert!(matches!(&b.events()[..], [ServerEvent::PlayerTransformed(_)]));
    assert!(arena.coord.registry().get(a.id).unwrap().transformed);

    arena.send(
        &a,
        ClientEvent::PlayerSkill(PlayerSkill {
            skill_id: 2,
            target_socket_id: Some(b.id),
            target_position: None,
            skill_type: Some("projectile".into()),
        }),
        20,
    );
    assert!(a.events().is_empty());
    assert!(matches!(&b.events()[..], [ServerEvent::PlayerSkillUsed(s)] if s.skill_id == 2));

    arena.send(&a, ClientEvent::PlayerTransformationEnd(Empty {}), 30);
    assert!(matches!(&a.events()[..], [ServerEvent::PlayerTransformationEnded(_)]));
    assert!(!arena.coord.registry().get(a.id).unwrap().transformed);
}

#[test]
fn test_ping_gets_pong() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.send(&a, ClientEvent::Ping(Empty {}), 0);
    assert!(matches!(&a.events()[..], [ServerEvent::Pong(_)]));
}

#[test]
fn test_messages_before_join_are_ignored() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.move_to(&a, Vec3::new(1.0, 0.0, 0.0), 0);
    arena.send(&a, ClientEvent::GetRoomPlayers(RoomRef::default()), 0);
    assert!(a.events().is_empty());
}

// =========================================================================
// Stats
// =========================================================================

#[test]
fn test_stats_applied_only_for_current_join() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let now = arena.at(0);
    let request = arena
        .coord
        .handle(a.id, join_event("r1", "ayla", Some("u1")), now)
        .expect("account holders get a stats request");
    assert_eq!(request.user_id, "u1");
    assert_eq!(request.character_class, "Warrior");
    a.events();

    let stats = StatBlock {
        endurance: 5.0,
        ..StatBlock::baseline()
    };
    arena.coord.apply_stats(a.id, request.join_seq + 1, stats);
    assert!(a.events().is_empty());

    arena.coord.apply_stats(a.id, request.join_seq, stats);
    assert!(matches!(
        &a.events()[..],
        [ServerEvent::PlayerHealthChanged(h)] if h.damage == 0.0 && h.max_health == 400.0 && h.current_health == 400.0
    ));
}

#[test]
fn test_guest_join_has_no_stats_request() {
    let mut arena = Arena::new();
    let a = arena.connect();
    let now = arena.at(0);
    assert!(arena.coord.handle(a.id, join_event("r1", "guest", None), now).is_none());
}

#[test]
fn test_identity_from_upgrade_fills_missing_join_fields() {
    let mut arena = Arena::new();
    let mut a = arena.connect_as(ConnectIdentity {
        user_id: Some("u9".into()),
        username: Some("ayla".into()),
    });
    let now = arena.at(0);
    let request = arena.coord.handle(
        a.id,
        ClientEvent::JoinRoom(JoinRoom {
            room_id: RoomId::new("r1"),
            username: None,
            character_class: None,
            user_id: None,
        }),
        now,
    );
    assert_eq!(request.map(|r| r.user_id), Some("u9".to_string()));
    assert!(matches!(
        &a.events()[0],
        ServerEvent::RoomPlayers(r) if r.players[0].username == "ayla"
    ));
}

#[test]
fn test_animation_reaches_peers_but_not_from_the_dead() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    a.events();
    b.events();

    let run = || {
        ClientEvent::PlayerAnimation(PlayerAnimation {
            animation: "Run".into(),
            speed: 1.5,
        })
    };
    arena.send(&a, run(), 10);
    assert!(a.events().is_empty());
    assert!(matches!(
        &b.events()[..],
        [ServerEvent::PlayerAnimationChanged(c)] if c.animation == "Run" && c.speed == 1.5
    ));
    assert_eq!(arena.coord.registry().get(a.id).unwrap().animation, "Run");

    arena.send(
        &a,
        ClientEvent::PlayerDamaged(PlayerDamaged {
            damage: 1_000.0,
            current_health: None,
            attacker_id: None,
        }),
        20,
    );
    b.events();
    arena.send(&a, run(), 30);
    assert!(b.events().is_empty());
    assert_eq!(arena.coord.registry().get(a.id).unwrap().animation, "Dead");
}

#[test]
fn test_visual_effect_defaults_bad_duration() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    a.events();

    arena.send(
        &a,
        ClientEvent::VisualEffectSpawned(VisualEffect {
            effect_type: "fireball".into(),
            effect_prefab_name: "FX_Fireball".into(),
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::ZERO,
            target_socket_id: None,
            duration: -4.0,
        }),
        10,
    );
    assert!(matches!(
        &a.events()[..],
        [ServerEvent::VisualEffectSpawned(v)] if v.duration == 1.0 && v.effect_type == "fireball"
    ));
}

// =========================================================================
// Heals, projectiles and effects
// =========================================================================

fn heal(target: Option<&Client>, amount: f32) -> ClientEvent {
    ClientEvent::PlayerHealed(PlayerHealed {
        target_socket_id: target.map(|t| t.id),
        heal_amount: amount,
    })
}

fn hurt(amount: f32) -> ClientEvent {
    ClientEvent::PlayerDamaged(PlayerDamaged {
        damage: amount,
        current_health: None,
        attacker_id: None,
    })
}

#[test]
fn test_heal_uses_server_health_and_caps_at_max() {
    let mut arena = Arena::new();
    let mut healer = arena.connect();
    let mut target = arena.connect();
    arena.join(&healer, "r1", 0);
    arena.join(&target, "r1", 0);
    arena.send(&target, hurt(30.0), 10);
    healer.events();
    target.events();

    arena.send(&healer, heal(Some(&target), 50.0), 20);
    assert_eq!(arena.health(&target), 100.0);

    let (healer_id, target_id) = (healer.id, target.id);
    for events in [healer.events(), target.events()] {
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::PlayerHealthChanged(h) if h.socket_id == target_id && h.current_health == 100.0
        )));
        assert!(
            events.iter().any(|e| matches!(
                e,
                ServerEvent::PlayerHealed(h)
                    if h.target_socket_id == target_id
                        && h.healer_socket_id == healer_id
                        && h.heal_amount == 30.0
                        && h.current_health == 100.0
                        && h.healer_name == format!("p{}", healer_id.into_inner())
            )),
            "{events:?}"
        );
    }
}

#[test]
fn test_heal_without_target_heals_the_sender() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    arena.join(&a, "r1", 0);
    arena.send(&a, hurt(40.0), 10);
    a.events();

    arena.send(&a, heal(None, 15.0), 20);
    assert_eq!(arena.health(&a), 75.0);
    assert!(a.events().iter().any(|e| matches!(e, ServerEvent::PlayerHealed(h) if h.target_socket_id == a.id)));
}

#[test]
fn test_heal_rejects_other_rooms_the_dead_and_bad_amounts() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut stranger = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&stranger, "r2", 0);
    arena.send(&stranger, hurt(50.0), 10);
    a.events();
    stranger.events();

    arena.send(&a, heal(Some(&stranger), 20.0), 20);
    assert_eq!(arena.health(&stranger), 50.0);

    arena.send(&stranger, heal(None, f32::NAN), 30);
    arena.send(&stranger, heal(None, -10.0), 31);
    assert_eq!(arena.health(&stranger), 50.0);

    arena.send(&stranger, hurt(500.0), 40);
    stranger.events();
    arena.send(&stranger, heal(None, 20.0), 50);
    assert_eq!(arena.health(&stranger), 0.0);
    assert!(!arena.coord.registry().get(stranger.id).unwrap().alive);

    assert!(a.events().is_empty());
    assert!(stranger.events().is_empty());
}

#[test]
fn test_projectile_reaches_peers_but_not_the_sender() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    a.events();
    b.events();

    arena.send(
        &a,
        ClientEvent::ProjectileSpawned(ProjectileSpawned {
            skill_id: 12,
            spawn_position: Vec3::new(0.0, 1.0, 0.0),
            direction: Vec3::new(0.0, 0.0, 1.0),
            target_socket_id: Some(b.id),
        }),
        10,
    );
    assert!(a.events().is_empty());
    assert!(matches!(
        &b.events()[..],
        [ServerEvent::ProjectileSpawned(p)]
            if p.socket_id == a.id && p.skill_id == 12 && p.target_socket_id == Some(b.id)
    ));

    arena.send(
        &a,
        ClientEvent::ProjectileSpawned(ProjectileSpawned {
            skill_id: 12,
            spawn_position: Vec3::new(f32::INFINITY, 0.0, 0.0),
            direction: Vec3::ZERO,
            target_socket_id: None,
        }),
        20,
    );
    assert!(b.events().is_empty());
}

#[test]
fn test_effect_relay_defaults_target_to_caster() {
    let mut arena = Arena::new();
    let mut a = arena.connect();
    let mut b = arena.connect();
    let stranger = arena.connect();
    arena.join(&a, "r1", 0);
    arena.join(&b, "r1", 0);
    arena.join(&stranger, "r2", 0);
    a.events();
    b.events();

    let effect = |target: Option<ConnectionId>| {
        ClientEvent::EffectApplied(EffectApplied {
            target_socket_id: target,
            effect_type: "haste".into(),
            duration: 5.0,
            power: 1.5,
            tick_interval: f32::NAN,
            particle_effect_prefab_name: "HasteAura".into(),
        })
    };

    arena.send(&a, effect(None), 10);
    assert!(a.events().is_empty());
    assert!(matches!(
        &b.events()[..],
        [ServerEvent::EffectApplied(e)]
            if e.caster_socket_id == a.id
                && e.target_socket_id == a.id
                && e.duration == 5.0
                && e.power == 1.5
                && e.tick_interval == 0.0
                && e.particle_effect_prefab_name == "HasteAura"
    ));

    arena.send(&a, effect(Some(stranger.id)), 20);
    assert!(b.events().is_empty());
}
