//! Rooms and stage controllers for Arena.
//!
//! A [`Room`] is one match session. It lives in a
//! [`RoomRegistry`] slot and is only touched while
//! that slot is locked. Its [`StageController`] walks the match through
//! its stages:
//!
//! ```text
//! WaitForJoin → RoundWarmup → <selection> → FinishSelection
//!     → GameplayWarmup → Gameplay → Results → (RoundWarmup | Ended)
//! ```
//!
//! Stage timers are [`arena_tick`] countdowns tagged with the stage they
//! end; when one elapses it re-locks the room and calls
//! [`StageController::on_countdown_elapsed`].
//!
//! # Key types
//!
//! - [`Room`]: users, match state, countdowns and the controller
//! - [`MatchContext`]: the room state a controller works on
//! - [`MatchController`]: the per-mode interface, implemented by
//!   [`RoundTournament`] and [`CardBattle`]
//! - [`Outbound`]: side effects the hub performs after the lock is gone

mod card_battle;
mod config;
mod context;
mod controller;
mod error;
mod outbound;
mod room;
mod round_tournament;
pub mod scoring;
mod selection;

pub use card_battle::CardBattle;
pub use config::MatchConfig;
pub use context::{MatchContext, STAGE_COUNTDOWN};
pub use controller::{MatchController, StageController};
pub use error::RoomError;
pub use outbound::{Outbound, OutboundSender};
pub use room::{Room, RoomRecord, RoomRegistry, RoomSnapshot, RoomUser};
pub use round_tournament::RoundTournament;
pub use selection::pick_near;
