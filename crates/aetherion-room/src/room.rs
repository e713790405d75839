//! A single room: its members, spawn pool and lobby machine.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use aetherion_protocol::{ConnectionId, RoomId};
use rand::Rng;

use crate::{LobbyMachine, PhaseEvent, RoomConfig, RoomError, RoomPhase, SpawnSlot, SpawnSlotPool};

/// What a successful join produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub slot: SpawnSlot,
    /// Phase change caused by this join, announced to the whole room
    /// (the second player opening the lobby).
    pub opened: Option<PhaseEvent>,
    /// Snapshot of the phase the joiner walked into, sent to the joiner
    /// alone.
    pub catch_up: Option<PhaseEvent>,
}

#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    max_players: usize,
    /// Ordered by connection id, which is allocation order, so rosters
    /// list players in the order they connected.
    members: BTreeSet<ConnectionId>,
    lobby: LobbyMachine,
    spawns: SpawnSlotPool,
}

impl Room {
    pub fn new(id: RoomId, config: &RoomConfig, now: Instant) -> Self {
        Self {
            id,
            max_players: config.max_players.max(1),
            members: BTreeSet::new(),
            lobby: LobbyMachine::new(config, now),
            spawns: SpawnSlotPool::new(config.spawn_slots, config.spawn_exhaustion),
        }
    }

    /// Admits a connection, assigning it a spawn slot.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyMember`] if the connection is already here
    /// - [`RoomError::RoomFull`] at capacity, or when the spawn pool is
    ///   exhausted under the reject policy
    pub fn join<R: Rng + ?Sized>(
        &mut self,
        conn_id: ConnectionId,
        now: Instant,
        rng: &mut R,
    ) -> Result<Admission, RoomError> {
        if self.members.contains(&conn_id) {
            return Err(RoomError::AlreadyMember(conn_id, self.id.clone()));
        }
        if self.members.len() >= self.max_players {
            return Err(RoomError::RoomFull(self.id.clone()));
        }
        let slot = self
            .spawns
            .allocate(rng)
            .ok_or_else(|| RoomError::RoomFull(self.id.clone()))?;

        let catch_up = self.lobby.catch_up(now);
        self.members.insert(conn_id);
        let opened = self.lobby.on_population(self.members.len(), now);

        tracing::info!(
            room_id = %self.id,
            %conn_id,
            spawn_index = slot.index,
            players = self.members.len(),
            phase = %self.lobby.phase(),
            "player joined room"
        );

        Ok(Admission {
            slot,
            opened,
            catch_up,
        })
    }

    /// Removes a member and frees its spawn slot. Returns `false` if the
    /// connection was not a member.
    pub fn leave(&mut self, conn_id: ConnectionId, spawn_index: usize) -> bool {
        if !self.members.remove(&conn_id) {
            return false;
        }
        self.spawns.release(spawn_index);
        tracing::info!(
            room_id = %self.id,
            %conn_id,
            players = self.members.len(),
            "player left room"
        );
        true
    }

    pub fn advance(&mut self, now: Instant) -> Vec<PhaseEvent> {
        let events = self.lobby.advance(now);
        for event in &events {
            if let PhaseEvent::LobbyTick { remaining } = event {
                tracing::trace!(room_id = %self.id, ?remaining, "lobby tick");
            } else {
                tracing::info!(room_id = %self.id, ?event, phase = %self.lobby.phase(), "room phase advanced");
            }
        }
        events
    }

    pub fn force_start(&mut self, now: Instant) -> Option<PhaseEvent> {
        let event = self.lobby.force_start(now);
        if event.is_some() {
            tracing::info!(room_id = %self.id, players = self.members.len(), "game force-started");
        }
        event
    }

    pub fn open_lobby(&mut self, wait: Duration, now: Instant) -> Option<PhaseEvent> {
        self.lobby.open_lobby(wait, now)
    }

    /// Disarms the lobby deadline. Called when the room is torn down.
    pub fn cancel_timers(&mut self) {
        self.lobby.cancel();
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn phase(&self) -> RoomPhase {
        self.lobby.phase()
    }

    pub fn lobby(&self) -> &LobbyMachine {
        &self.lobby
    }

    pub fn spawns(&self) -> &SpawnSlotPool {
        &self.spawns
    }

    pub fn members(&self) -> &BTreeSet<ConnectionId> {
        &self.members
    }

    pub fn contains(&self, conn_id: ConnectionId) -> bool {
        self.members.contains(&conn_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }
}
