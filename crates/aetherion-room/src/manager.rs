//! Room manager: creates rooms on demand and tracks membership.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use aetherion_protocol::{ConnectionId, RoomId};
use rand::Rng;

use crate::{Admission, PhaseEvent, Room, RoomConfig, RoomError};

/// What happened when a connection left its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    /// `true` if the room emptied and was torn down.
    pub room_closed: bool,
}

/// All live rooms, plus an index of which room each connection is in.
///
/// A connection is in at most ONE room at a time. Rooms are created by
/// their first join and dropped (timers cancelled) when the last member
/// leaves.
#[derive(Debug, Default)]
pub struct RoomManager {
    config: RoomConfig,
    rooms: HashMap<RoomId, Room>,
    player_rooms: HashMap<ConnectionId, RoomId>,
}

impl RoomManager {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Adds a connection to a room, creating the room if needed.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyMember`] if the connection is in any room;
    ///   callers leave the old room first
    /// - [`RoomError::RoomFull`] from the room itself
    pub fn join<R: Rng + ?Sized>(
        &mut self,
        room_id: &RoomId,
        conn_id: ConnectionId,
        now: Instant,
        rng: &mut R,
    ) -> Result<Admission, RoomError> {
        if let Some(current) = self.player_rooms.get(&conn_id) {
            return Err(RoomError::AlreadyMember(conn_id, current.clone()));
        }

        let created = !self.rooms.contains_key(room_id);
        let room = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| Room::new(room_id.clone(), &self.config, now));
        if created {
            tracing::info!(%room_id, "room created");
        }

        match room.join(conn_id, now, rng) {
            Ok(admission) => {
                self.player_rooms.insert(conn_id, room_id.clone());
                Ok(admission)
            }
            Err(e) => {
                if created {
                    self.rooms.remove(room_id);
                }
                Err(e)
            }
        }
    }

    /// Removes a connection from whatever room it is in. Returns `None`
    /// if it was not in a room.
    pub fn leave(&mut self, conn_id: ConnectionId, spawn_index: usize) -> Option<Departure> {
        let room_id = self.player_rooms.remove(&conn_id)?;
        let room = self.rooms.get_mut(&room_id)?;
        room.leave(conn_id, spawn_index);

        let room_closed = room.is_empty();
        if room_closed {
            room.cancel_timers();
            self.rooms.remove(&room_id);
            tracing::info!(%room_id, "room closed");
        }
        Some(Departure {
            room_id,
            room_closed,
        })
    }

    /// Fires due deadlines in every room. Rooms with nothing to report are
    /// left out of the result.
    pub fn advance_all(&mut self, now: Instant) -> Vec<(RoomId, Vec<PhaseEvent>)> {
        self.rooms
            .iter_mut()
            .filter_map(|(id, room)| {
                let events = room.advance(now);
                (!events.is_empty()).then(|| (id.clone(), events))
            })
            .collect()
    }

    pub fn force_start(&mut self, room_id: &RoomId, now: Instant) -> Result<Option<PhaseEvent>, RoomError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        Ok(room.force_start(now))
    }

    /// Opens a room's lobby with a client-requested wait (milliseconds),
    /// clamped to the configured bounds.
    pub fn open_lobby(
        &mut self,
        room_id: &RoomId,
        requested_ms: Option<u64>,
        now: Instant,
    ) -> Result<Option<PhaseEvent>, RoomError> {
        let wait: Duration = self.config.requested_wait(requested_ms);
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        Ok(room.open_lobby(wait, now))
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_of(&self, conn_id: ConnectionId) -> Option<&RoomId> {
        self.player_rooms.get(&conn_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
