//! Error types for the room layer.

use arena_protocol::{RoomId, UserId};
use arena_registry::RegistryError;

/// Errors that can occur during room operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    /// The operation is not valid for the room's current stage or for this
    /// user: wrong stage, not the active user, card not in hand, already
    /// acted. The room is left unchanged.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    /// The user is not in this room.
    #[error("user {0} not in room {1}")]
    NotInRoom(UserId, RoomId),

    /// The user is already in a room.
    #[error("user {0} already in room {1}")]
    AlreadyInRoom(UserId, RoomId),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RoomError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }
}
