//! The connection registry: who is online, where, doing what.
//!
//! `SessionRegistry` is NOT thread-safe by itself; it is a plain
//! `HashMap` owned by the coordinator, which sits behind the server's
//! lock.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Instant;

use aetherion_protocol::{ConnectionId, RoomId, RosterEntry};

use crate::{JoinInfo, PlayerSession, SessionError, SessionUpdate};

/// All live player sessions, keyed by connection.
///
/// ```text
/// join_room ──→ register() ──→ get()/get_mut()/update() ... ──→ remove()
///                                                                  │
///                                             disconnect / room switch
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, PlayerSession>,
    next_join_seq: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session for a connection that just joined a room.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyRegistered`] if the connection
    /// already has a session.
    pub fn register(
        &mut self,
        conn_id: ConnectionId,
        info: JoinInfo,
        now: Instant,
    ) -> Result<&PlayerSession, SessionError> {
        match self.sessions.entry(conn_id) {
            Entry::Occupied(_) => Err(SessionError::AlreadyRegistered(conn_id)),
            Entry::Vacant(slot) => {
                self.next_join_seq += 1;
                let session = slot.insert(PlayerSession::new(
                    conn_id,
                    self.next_join_seq,
                    info,
                    now,
                ));
                tracing::debug!(
                    %conn_id,
                    room_id = %session.room_id,
                    username = %session.username,
                    spawn_index = session.spawn_index,
                    "session registered"
                );
                Ok(session)
            }
        }
    }

    pub fn get(&self, conn_id: ConnectionId) -> Option<&PlayerSession> {
        self.sessions.get(&conn_id)
    }

    pub fn get_mut(&mut self, conn_id: ConnectionId) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&conn_id)
    }

    /// Applies a partial update. Returns `false` if the connection has no
    /// session (a message that raced a disconnect).
    pub fn update(&mut self, conn_id: ConnectionId, update: SessionUpdate) -> bool {
        match self.sessions.get_mut(&conn_id) {
            Some(session) => {
                update.apply(session);
                true
            }
            None => false,
        }
    }

    /// Removes and returns a session. Removing an unknown id is a no-op.
    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<PlayerSession> {
        let removed = self.sessions.remove(&conn_id);
        if let Some(session) = &removed {
            tracing::debug!(%conn_id, room_id = %session.room_id, "session removed");
        }
        removed
    }

    /// Sessions whose room is `room_id`, in no particular order.
    pub fn in_room<'a>(
        &'a self,
        room_id: &'a RoomId,
    ) -> impl Iterator<Item = &'a PlayerSession> + 'a {
        self.sessions.values().filter(move |s| &s.room_id == room_id)
    }

    /// The session an account already holds in a room, if any.
    pub fn find_in_room_by_user(&self, room_id: &RoomId, user_id: &str) -> Option<ConnectionId> {
        self.in_room(room_id)
            .find(|s| s.user_id.as_deref() == Some(user_id))
            .map(|s| s.conn_id)
    }

    /// Roster entries for the given connections, in the given order.
    /// Connections without a session are skipped.
    pub fn roster<'a>(
        &self,
        members: impl IntoIterator<Item = &'a ConnectionId>,
    ) -> Vec<RosterEntry> {
        members
            .into_iter()
            .filter_map(|id| self.sessions.get(id))
            .map(PlayerSession::roster_entry)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
