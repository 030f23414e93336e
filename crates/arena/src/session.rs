//! Per-user hub state.

use arena_protocol::{PoolId, RoomId, UserId};
use arena_registry::{Entity, EntityRegistry};

/// Where a connected user currently is. Lives in the session registry;
/// always lock a user's session before any room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: UserId,
    pub room_id: Option<RoomId>,
    /// The pool the user is queued (or invited, or awaiting a room) in.
    pub queue: Option<PoolId>,
}

pub(crate) type SessionRegistry = EntityRegistry<UserId, UserSession>;

impl UserSession {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            room_id: None,
            queue: None,
        }
    }

    /// Neither in a room nor in a queue. Idle sessions are destroyed.
    pub fn is_idle(&self) -> bool {
        self.room_id.is_none() && self.queue.is_none()
    }
}

impl Entity for UserSession {
    type View = UserSession;

    fn view(&self) -> UserSession {
        self.clone()
    }
}
