//! # Arena
//!
//! Session orchestration for multiplayer match servers.
//!
//! An [`Arena`] owns the live rooms, the users' sessions and one
//! matchmaking queue per rating pool. A connection layer calls its
//! operations ([`join_room`](Arena::join_room),
//! [`dispatch_user_action`](Arena::dispatch_user_action),
//! [`queue_join`](Arena::queue_join), ...) and supplies three
//! collaborators: [`Persistence`], [`Notifier`] and [`ScoreSource`].
//!
//! ```text
//! connection layer → Arena → EntityRegistry<Room> → StageController
//!                                      │
//!                       Outbound ──────┴──→ dispatcher → Notifier / Persistence
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use arena::prelude::*;
//!
//! arena::init_tracing();
//! let arena = Arena::builder().build(my_db, my_notifier, my_scores);
//! arena.spawn_matchmaking();
//! arena.queue_join(UserId(1), PoolId(1)).await?;
//! ```

mod arena;
mod config;
mod dispatch;
mod error;
mod metrics;
mod services;
mod session;

pub use arena::{Arena, ArenaBuilder};
pub use config::ArenaConfig;
pub use error::{ArenaError, ServiceError};
pub use metrics::{ArenaMetrics, MetricsSnapshot};
pub use services::{NewRoom, Notifier, Persistence, ScoreSource, UserEvent, UserStats};
pub use session::UserSession;

/// Installs a `tracing-subscriber` formatter filtered by `RUST_LOG`
/// (default `info`). For binaries; libraries and tests shouldn't call it.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Everything a server embedding Arena usually needs.
pub mod prelude {
    pub use crate::{
        Arena, ArenaBuilder, ArenaConfig, ArenaError, ArenaMetrics, NewRoom, Notifier,
        Persistence, ScoreSource, ServiceError, UserEvent, UserStats,
    };
    pub use arena_matchmaking::{QueueConfig, QueueError};
    pub use arena_protocol::{
        ItemId, MatchEvent, MatchMode, PlaylistItem, PoolId, QueueEvent, RoomId, Stage,
        UserAction, UserId,
    };
    pub use arena_room::{MatchConfig, RoomError, RoomRecord, RoomSnapshot};
}
