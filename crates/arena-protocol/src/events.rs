//! Inbound actions and outbound events.
//!
//! Everything here is `#[serde(tag = "type")]` (internally tagged), so a
//! client sees `{ "type": "VoteItem", "item_id": 12 }` rather than nested
//! objects.

use serde::{Deserialize, Serialize};

use crate::{Card, CardId, GroupId, ItemId, PoolId, RoomId, Stage, UserId};

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who a room event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every user in the room.
    All,
    /// One user only (private data such as a card hand).
    User(UserId),
}

// ---------------------------------------------------------------------------
// UserAction (inbound)
// ---------------------------------------------------------------------------

/// An action a user submits to the room they are in.
///
/// Which actions are legal depends on the room's mode and current stage.
/// An illegal action is rejected without changing the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserAction {
    /// Round tournament: vote for the item to play this round.
    VoteItem { item_id: ItemId },

    /// Card battle: discard cards from the hand and draw replacements.
    /// An empty list means "keep my hand".
    DiscardCards { card_ids: Vec<CardId> },

    /// Card battle: the active user plays a card from their hand.
    PlayCard { card_id: CardId },

    /// Ready to start gameplay.
    SetReady { ready: bool },

    /// Whether the user has the selected item available locally.
    SetAvailability { available: bool },
}

// ---------------------------------------------------------------------------
// MatchEvent (outbound, per room)
// ---------------------------------------------------------------------------

/// Public state of a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownView {
    pub id: u64,
    pub stage: Stage,
    pub remaining_ms: u64,
}

/// One user's line in the standings after a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub user_id: UserId,
    /// Score this round, if the user submitted one.
    pub round_score: Option<u64>,
    pub round_placement: Option<u32>,
    pub round_points: u32,
    pub total_points: u32,
    /// Overall placement across all rounds so far.
    pub placement: u32,
    /// Card battle: life left after this round's damage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life: Option<u64>,
}

/// Final placement of a user when the match ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalPlacement {
    pub user_id: UserId,
    pub placement: u32,
}

/// Events a room emits while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchEvent {
    UserJoined { user_id: UserId },
    UserLeft { user_id: UserId },
    UserStateChanged { user_id: UserId, ready: bool, available: bool },

    StageChanged { stage: Stage, round: u32 },
    CountdownChanged { countdown: Option<CountdownView> },

    // -- Round tournament --
    ItemVoted { user_id: UserId, item_id: ItemId },
    ItemSelected { item_id: ItemId },
    RoundResults { round: u32, standings: Vec<Standing> },

    // -- Card battle --
    /// Sent privately to the hand's owner.
    HandUpdated { cards: Vec<Card> },
    CardsDiscarded { user_id: UserId, count: usize },
    ActiveUserChanged { user_id: UserId },
    CardPlayed { user_id: UserId, card: Card },
    LifeChanged { user_id: UserId, damage: u64, life: u64 },

    // -- Shared --
    GameplayStarted { item_id: ItemId, users: Vec<UserId> },
    MatchEnded { placements: Vec<FinalPlacement> },
}

// ---------------------------------------------------------------------------
// QueueEvent (outbound, per user)
// ---------------------------------------------------------------------------

/// Events the matchmaking layer sends to individual users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    /// The user is (again) actively searching in this pool.
    Searching { pool_id: PoolId },
    /// A group was formed; the user should accept or decline.
    Invited { group_id: GroupId, users: Vec<UserId> },
    /// The user has left the queue (explicitly, by declining, or by timeout).
    Removed { pool_id: PoolId },
    /// Everyone accepted and the room is ready to join.
    RoomReady { room_id: RoomId },
}
