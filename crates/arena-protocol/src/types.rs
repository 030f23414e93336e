//! Identity and value types shared by every Arena crate.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a connected user.
///
/// Newtype wrapper around the 64-bit id handed to us by the identity
/// layer. `#[serde(transparent)]` keeps it a plain number on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A unique identifier for a room (one match session).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A playlist item (one beatmap in a room's pool).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I-{}", self.0)
    }
}

/// A rating pool. Each pool has its own matchmaking queue and its own
/// per-user rating.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PoolId(pub u32);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A card in a card-battle hand. Unique within one room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CardId(pub u32);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// A matchmaking group proposed by the queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Rating
// ---------------------------------------------------------------------------

/// A skill estimate: `mu` is the mean, `sigma` the uncertainty.
///
/// Matchmaking compares `mu` values; `sigma` shrinks as a user plays more
/// matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub mu: f64,
    pub sigma: f64,
}

impl Rating {
    pub const INITIAL_MU: f64 = 1500.0;
    pub const INITIAL_SIGMA: f64 = 350.0;

    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self::new(Self::INITIAL_MU, Self::INITIAL_SIGMA)
    }
}

// ---------------------------------------------------------------------------
// Playlist items and cards
// ---------------------------------------------------------------------------

/// One item in a room's playlist.
///
/// `difficulty` is expressed on the same scale as [`Rating::mu`], so it can
/// be compared directly against player ratings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: ItemId,
    pub difficulty: f64,
}

/// A card-battle card. Each card stands for one playlist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub item_id: ItemId,
}

/// Which stage controller drives a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    RoundTournament,
    CardBattle,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundTournament => write!(f, "round_tournament"),
            Self::CardBattle => write!(f, "card_battle"),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One named phase of a match.
///
/// Both controllers walk the same general shape:
///
/// ```text
/// WaitForJoin → RoundWarmup → <selection> → FinishSelection
///     → GameplayWarmup → Gameplay → Results → (RoundWarmup | Ended)
/// ```
///
/// The round tournament selects through `BeatmapSelect`; the card battle
/// selects through `CardDiscard` then `CardPlay`. Variants are declared in
/// lifecycle order, so `Ord` follows the order a round is played in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Stage {
    WaitForJoin,
    RoundWarmup,
    BeatmapSelect,
    CardDiscard,
    CardPlay,
    FinishSelection,
    GameplayWarmup,
    Gameplay,
    Results,
    Ended,
}

impl Stage {
    /// Returns `true` for the stages in which users pick what to play.
    pub fn is_selection(&self) -> bool {
        matches!(self, Self::BeatmapSelect | Self::CardDiscard | Self::CardPlay)
    }

    /// Returns `true` once the match can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
