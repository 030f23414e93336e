//! Shared vocabulary for Arena.
//!
//! This crate defines everything that crosses a boundary between the
//! orchestration core and the outside world:
//!
//! - **Identity types** ([`UserId`], [`RoomId`], [`ItemId`], ...): newtype
//!   wrappers so ids of different kinds can't be mixed up.
//! - **Inputs** ([`UserAction`]): what a connected user can ask a room to do.
//! - **Outputs** ([`MatchEvent`], [`QueueEvent`]): structured events handed
//!   to the notifier collaborator. The core never encodes them itself.
//!
//! ```text
//! Dispatcher (external) → UserAction → Room → MatchEvent → Notifier (external)
//! ```

mod events;
mod types;

pub use events::{
    CountdownView, FinalPlacement, MatchEvent, QueueEvent, Recipient, Standing,
    UserAction,
};
pub use types::{
    Card, CardId, GroupId, ItemId, MatchMode, PlaylistItem, PoolId, Rating, RoomId,
    Stage, UserId,
};
