//! Match configuration shared by both stage controllers.

use std::time::Duration;

use arena_protocol::Rating;

/// Stage timings and rules for a match.
///
/// One `MatchConfig` is shared (behind an `Arc`) by every room a hub
/// creates.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Pause before each round's selection starts.
    pub round_warmup: Duration,

    /// Round tournament: how long users may vote for an item.
    pub beatmap_select: Duration,

    /// Card battle: how long users may discard.
    pub card_discard: Duration,

    /// Card battle: how long the active user has to play a card. On expiry
    /// a random card from their hand is played.
    pub card_play: Duration,

    /// Pause after the item is known, before warmup.
    pub finish_selection: Duration,

    /// Minimum warmup before gameplay. Gameplay also waits for every user
    /// to be ready and have the item available.
    pub gameplay_warmup: Duration,

    /// How long round results are shown.
    pub results: Duration,

    /// How long an ended room stays open before it is torn down.
    pub close_delay: Duration,

    /// Round tournament: rounds per match. Default: 5.
    pub rounds: u32,

    /// Round tournament: points awarded by round placement (index 0 is
    /// first place). Placements past the end of the table score 0.
    pub points: Vec<u32>,

    /// Card battle: cards per hand. Default: 5.
    pub hand_size: usize,

    /// Card battle: life each user starts with.
    pub starting_life: u64,

    /// Card battle: difficulty at which a score gap converts to damage 1:1.
    pub reference_difficulty: f64,

    /// Spread (sigma) of the Gaussian that weights item selection toward
    /// the lowest-rated user in the room.
    pub selection_spread: f64,

    /// Fixed RNG seed for turn order, draws and item picks. `None` seeds
    /// from the OS.
    pub seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            round_warmup: Duration::from_secs(5),
            beatmap_select: Duration::from_secs(30),
            card_discard: Duration::from_secs(20),
            card_play: Duration::from_secs(20),
            finish_selection: Duration::from_secs(5),
            gameplay_warmup: Duration::from_secs(10),
            results: Duration::from_secs(15),
            close_delay: Duration::from_secs(30),
            rounds: 5,
            points: vec![15, 12, 10, 8, 6, 4, 2, 1],
            hand_size: 5,
            starting_life: 1_000_000,
            reference_difficulty: Rating::INITIAL_MU,
            selection_spread: 200.0,
            seed: None,
        }
    }
}

impl MatchConfig {
    /// Clamps values a match can't run with.
    pub fn validated(mut self) -> Self {
        if self.rounds == 0 {
            tracing::warn!("rounds of 0 is invalid, using 1");
            self.rounds = 1;
        }
        if self.hand_size == 0 {
            tracing::warn!("hand_size of 0 is invalid, using 1");
            self.hand_size = 1;
        }
        if self.starting_life == 0 {
            tracing::warn!("starting_life of 0 is invalid, using 1");
            self.starting_life = 1;
        }
        if !(self.reference_difficulty.is_finite() && self.reference_difficulty > 0.0) {
            tracing::warn!(
                reference_difficulty = self.reference_difficulty,
                "invalid reference_difficulty, using {}",
                Rating::INITIAL_MU
            );
            self.reference_difficulty = Rating::INITIAL_MU;
        }
        if !(self.selection_spread.is_finite() && self.selection_spread > 0.0) {
            tracing::warn!(
                selection_spread = self.selection_spread,
                "invalid selection_spread, using 1.0"
            );
            self.selection_spread = 1.0;
        }
        self
    }

    /// Points for a 1-based round placement.
    pub fn points_for(&self, placement: u32) -> u32 {
        placement
            .checked_sub(1)
            .and_then(|index| self.points.get(index as usize))
            .copied()
            .unwrap_or(0)
    }
}
