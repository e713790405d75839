use aetherion_protocol::{ConnectionId, RoomId};

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this id exists.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room is at capacity, or its spawn pool is exhausted under the
    /// reject policy.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The connection is already a member of this room.
    #[error("{0} is already in room {1}")]
    AlreadyMember(ConnectionId, RoomId),
}
