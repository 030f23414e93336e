//! Rating math: search radius growth and the post-match Elo update.

use std::time::Duration;

use arena_protocol::Rating;

/// Elo K-factor for a full round of pairwise comparisons.
pub const ELO_K: f64 = 32.0;

/// Sigma shrinks by this factor after every match.
pub const SIGMA_DECAY: f64 = 0.97;

/// Floor for sigma.
pub const MIN_SIGMA: f64 = 50.0;

/// Acceptable rating distance after waiting `waited`:
/// `base · 2^(waited / doubling)`.
pub fn search_radius(base: f64, doubling: Duration, waited: Duration) -> f64 {
    base * 2f64.powf(waited.as_secs_f64() / doubling.as_secs_f64())
}

/// Multi-player Elo.
///
/// Each entry is a rating and a final placement (1 = best, ties allowed).
/// Every pair of players is scored as a two-player game; a player's gain
/// is the sum of `actual - expected` over opponents, scaled by
/// `K / (n - 1)`. Returns the new ratings in input order.
pub fn elo_update(entries: &[(Rating, u32)]) -> Vec<Rating> {
    let n = entries.len();
    if n < 2 {
        return entries.iter().map(|(rating, _)| *rating).collect();
    }

    entries
        .iter()
        .enumerate()
        .map(|(i, (rating, placement))| {
            let delta: f64 = entries
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, (other, other_placement))| {
                    let expected = 1.0 / (1.0 + 10f64.powf((other.mu - rating.mu) / 400.0));
                    let actual = match placement.cmp(other_placement) {
                        std::cmp::Ordering::Less => 1.0,
                        std::cmp::Ordering::Equal => 0.5,
                        std::cmp::Ordering::Greater => 0.0,
                    };
                    actual - expected
                })
                .sum();

            Rating {
                mu: rating.mu + ELO_K * delta / (n - 1) as f64,
                sigma: (rating.sigma * SIGMA_DECAY).max(MIN_SIGMA),
            }
        })
        .collect()
}
