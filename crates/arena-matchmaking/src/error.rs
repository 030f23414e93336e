//! Error types for the matchmaking layer.

use arena_protocol::UserId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The user isn't in this queue.
    #[error("user {0} is not queued")]
    NotQueued(UserId),

    /// The user is queued but has no pending invitation.
    #[error("user {0} has no pending invitation")]
    NotInvited(UserId),

    /// A membership invariant would be broken (e.g. queueing twice, or
    /// queueing while in a room).
    #[error("capacity violation for user {user_id}: {reason}")]
    Capacity { user_id: UserId, reason: String },
}
