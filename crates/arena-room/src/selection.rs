//! Gaussian-weighted item pick.

use arena_protocol::PlaylistItem;
use rand::Rng;

/// Picks one candidate at random, weighting each by how close its
/// difficulty is to `target`:
///
/// ```text
/// w = exp(-(difficulty - target)² / (2 · spread²))
/// ```
///
/// Falls back to a uniform pick if every weight underflows to zero.
pub fn pick_near<R: Rng + ?Sized>(
    candidates: &[PlaylistItem],
    target: f64,
    spread: f64,
    rng: &mut R,
) -> Option<PlaylistItem> {
    if candidates.is_empty() {
        return None;
    }

    let weights: Vec<f64> = candidates
        .iter()
        .map(|item| {
            let d = item.difficulty - target;
            (-(d * d) / (2.0 * spread * spread)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();

    if !(total.is_finite() && total > 0.0) {
        return Some(candidates[rng.random_range(0..candidates.len())]);
    }

    let mut roll = rng.random_range(0.0..total);
    for (item, weight) in candidates.iter().zip(&weights) {
        if roll < *weight {
            return Some(*item);
        }
        roll -= weight;
    }
    candidates.last().copied()
}
