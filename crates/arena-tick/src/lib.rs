//! Timing primitives for Arena.
//!
//! - [`Countdown`] / [`Countdowns`]: "this stage ends in N seconds, then
//!   run X". The wait happens without holding the host's lock; the
//!   continuation runs after re-acquiring it through the
//!   [`EntityRegistry`](arena_registry::EntityRegistry).
//! - [`TickScheduler`]: a fixed-interval driver for background loops such
//!   as the matchmaking tick.
//!
//! # Countdown lifecycle
//!
//! ```text
//! start ──wait (unlocked)──┬─ deadline ─┐
//!                          ├─ finish() ─┼─→ acquire host ─→ clear ─→ continuation
//!                          └─ stop() ───┴─→ (nothing runs)
//! ```

mod countdown;
mod scheduler;

pub use countdown::{
    Continuation, Countdown, CountdownClass, CountdownHost, CountdownInfo, Countdowns,
};
pub use scheduler::{TickConfig, TickInfo, TickScheduler};
