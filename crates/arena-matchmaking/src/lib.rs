//! Rating-based matchmaking for Arena.
//!
//! A [`MatchmakingQueue`] holds the users searching in one rating pool.
//! A periodic [`update`](MatchmakingQueue::update) groups them by rating
//! proximity, with a search radius that doubles every
//! [`QueueConfig::doubling_period`] a user has waited. Formed groups are
//! invitations: once every member accepts, the group completes and leaves
//! the queue; if anyone declines or times out, the rest go back to
//! searching.
//!
//! The queue is a plain struct with
//! `&mut self` methods. The owner wraps it in one lock.

mod config;
mod error;
mod queue;
mod rating;

pub use config::QueueConfig;
pub use error::QueueError;
pub use queue::{MatchmakingQueue, QueueGroup, QueueUpdateBundle, QueueUser};
pub use rating::{ELO_K, MIN_SIGMA, SIGMA_DECAY, elo_update, search_radius};
