//! Hub configuration.

use std::time::Duration;

use arena_matchmaking::QueueConfig;
use arena_registry::RegistryConfig;
use arena_room::MatchConfig;
use arena_tick::TickConfig;

/// Everything an [`Arena`](crate::Arena) is configured with.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Lock timeout for the room and session registries.
    pub registry: RegistryConfig,
    /// Settings shared by every pool's queue.
    pub queue: QueueConfig,
    /// Stage durations and scoring for every room.
    pub matching: MatchConfig,
    /// How often the background loop runs a matchmaking tick.
    /// Default: 1 second.
    pub matchmaking_interval: Duration,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            queue: QueueConfig::default(),
            matching: MatchConfig::default(),
            matchmaking_interval: Duration::from_secs(1),
        }
    }
}

impl ArenaConfig {
    /// Validates every nested config.
    pub fn validated(self) -> Self {
        let interval = TickConfig::every(self.matchmaking_interval)
            .validated()
            .interval;
        Self {
            registry: self.registry,
            queue: self.queue.validated(),
            matching: self.matching.validated(),
            matchmaking_interval: interval,
        }
    }
}
