//! Unified error type for the Arena hub.

use arena_matchmaking::QueueError;
use arena_registry::RegistryError;
use arena_room::RoomError;

/// A collaborator (persistence, notifier, score source) failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// The collaborator has no record of what was asked for.
    #[error("{0} not found")]
    NotFound(String),

    /// The collaborator could not be reached or refused the call.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArenaError {
    /// Lock timeout, missing or destroyed entity.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The room rejected the operation.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The matchmaking queue rejected the operation.
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ArenaError {
    /// `true` for routine rejections the caller should simply report back
    /// (wrong stage, not in the room, not queued, unknown id). `false` for
    /// infrastructure failures such as lock timeouts and collaborator
    /// outages.
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Registry(e) => registry_rejection(e),
            Self::Room(RoomError::Registry(e)) => registry_rejection(e),
            Self::Room(_) => true,
            Self::Queue(_) => true,
            Self::Service(ServiceError::NotFound(_)) => true,
            Self::Service(ServiceError::Unavailable(_)) => false,
        }
    }
}

fn registry_rejection(error: &RegistryError) -> bool {
    !matches!(error, RegistryError::LockTimeout { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_protocol::{RoomId, UserId};

    #[test]
    fn test_from_room_error() {
        let err: ArenaError = RoomError::NotInRoom(UserId(1), RoomId(2)).into();
        assert!(matches!(err, ArenaError::Room(_)));
        assert!(err.to_string().contains("U-1"));
    }

    #[test]
    fn test_invalid_state_is_rejection() {
        let err: ArenaError = RoomError::InvalidState("wrong stage".into()).into();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_queue_error_is_rejection() {
        let err: ArenaError = QueueError::NotQueued(UserId(1)).into();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_lock_timeout_is_not_rejection() {
        let timeout = RegistryError::LockTimeout {
            kind: "room",
            id: "R-1".into(),
        };
        assert!(!ArenaError::from(timeout.clone()).is_rejection());
        assert!(!ArenaError::from(RoomError::from(timeout)).is_rejection());
    }

    #[test]
    fn test_service_outage_is_not_rejection() {
        let err: ArenaError = ServiceError::Unavailable("db down".into()).into();
        assert!(!err.is_rejection());
        let err: ArenaError = ServiceError::NotFound("room R-1".into()).into();
        assert!(err.is_rejection());
    }
}
