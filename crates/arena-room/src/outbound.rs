//! Side effects a room asks the hub to perform once its lock is released.

use arena_protocol::{FinalPlacement, ItemId, MatchEvent, PoolId, Recipient, RoomId};
use tokio::sync::mpsc;

/// One queued side effect.
///
/// A locked room never calls out to a collaborator directly. It pushes an
/// `Outbound` and the hub's dispatcher task performs it after the lock is
/// gone.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Deliver an event to the room or to one of its users.
    Event {
        room_id: RoomId,
        recipient: Recipient,
        event: MatchEvent,
    },

    /// The room has been opened and is accepting its users.
    MarkRoomActive { room_id: RoomId },

    /// Gameplay of an item started.
    RecordPlayedItem { room_id: RoomId, item_id: ItemId },

    /// The match ended; ratings in `pool_id` should be updated.
    RecordMatchResults {
        room_id: RoomId,
        pool_id: PoolId,
        placements: Vec<FinalPlacement>,
    },

    /// The room's close countdown elapsed; tear it down.
    CloseRoom { room_id: RoomId },
}

impl Outbound {
    /// The room this effect belongs to.
    pub fn room_id(&self) -> RoomId {
        match self {
            Outbound::Event { room_id, .. }
            | Outbound::MarkRoomActive { room_id }
            | Outbound::RecordPlayedItem { room_id, .. }
            | Outbound::RecordMatchResults { room_id, .. }
            | Outbound::CloseRoom { room_id } => *room_id,
        }
    }
}

/// Channel sender the rooms push into.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
