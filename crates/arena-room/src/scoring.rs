//! Round placements and cumulative standings.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use arena_protocol::{FinalPlacement, Standing, UserId};

use crate::MatchConfig;

/// Ranks scores highest first using competition ranking: equal scores
/// share a placement and the next placement skips ("1, 2, 2, 4").
///
/// Returns `(user, score, placement)` ordered by placement, then user id.
pub fn rank_by_score(scores: &[(UserId, u64)]) -> Vec<(UserId, u64, u32)> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut ranked = Vec::with_capacity(sorted.len());
    let mut placement = 0;
    let mut previous = None;
    for (index, (user_id, score)) in sorted.into_iter().enumerate() {
        if previous != Some(score) {
            placement = index as u32 + 1;
            previous = Some(score);
        }
        ranked.push((user_id, score, placement));
    }
    ranked
}

/// Competition placements for values that rank highest first, given in
/// that order. `key` extracts what counts as a tie.
pub(crate) fn competition_placements<T, K: PartialEq>(
    ordered: &[T],
    key: impl Fn(&T) -> K,
) -> Vec<u32> {
    let mut placements = Vec::with_capacity(ordered.len());
    let mut current = 0;
    for (index, item) in ordered.iter().enumerate() {
        if index == 0 || key(&ordered[index - 1]) != key(item) {
            current = index as u32 + 1;
        }
        placements.push(current);
    }
    placements
}

/// One user's running total in a round tournament.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub total_points: u32,
    /// `histogram[i]` is how many rounds the user finished in place `i + 1`.
    pub histogram: Vec<u32>,
}

impl Tally {
    fn record(&mut self, placement: u32, points: u32) {
        self.total_points += points;
        let index = placement.saturating_sub(1) as usize;
        if self.histogram.len() <= index {
            self.histogram.resize(index + 1, 0);
        }
        self.histogram[index] += 1;
    }

    fn count(&self, index: usize) -> u32 {
        self.histogram.get(index).copied().unwrap_or(0)
    }
}

/// Orders two tallies best first: more points, then more first places,
/// then more second places, and so on.
fn compare_tallies(a: &Tally, b: &Tally) -> Ordering {
    b.total_points.cmp(&a.total_points).then_with(|| {
        let len = a.histogram.len().max(b.histogram.len());
        (0..len)
            .map(|i| b.count(i).cmp(&a.count(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

/// Cumulative round-tournament scores.
#[derive(Debug, Clone, Default)]
pub struct ScoreBoard {
    tallies: BTreeMap<UserId, Tally>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure `user_id` appears in the standings, with zero points if
    /// they have not played yet.
    pub fn add_user(&mut self, user_id: UserId) {
        self.tallies.entry(user_id).or_default();
    }

    pub fn tally(&self, user_id: UserId) -> Option<&Tally> {
        self.tallies.get(&user_id)
    }

    /// Applies one round's scores and returns the standings including the
    /// round's details. Users without a score get no round placement and
    /// no points.
    pub fn record_round(&mut self, scores: &[(UserId, u64)], config: &MatchConfig) -> Vec<Standing> {
        let ranked = rank_by_score(scores);
        let mut round: BTreeMap<UserId, (u64, u32, u32)> = BTreeMap::new();
        for (user_id, score, placement) in ranked {
            let points = config.points_for(placement);
            self.tallies.entry(user_id).or_default().record(placement, points);
            round.insert(user_id, (score, placement, points));
        }

        let mut standings = self.standings();
        for standing in &mut standings {
            if let Some(&(score, placement, points)) = round.get(&standing.user_id) {
                standing.round_score = Some(score);
                standing.round_placement = Some(placement);
                standing.round_points = points;
            }
        }
        standings
    }

    /// Users in overall order: points, then placement histogram, then
    /// ascending user id.
    pub fn overall_order(&self) -> Vec<UserId> {
        let mut users: Vec<(&UserId, &Tally)> = self.tallies.iter().collect();
        users.sort_by(|a, b| compare_tallies(a.1, b.1).then(a.0.cmp(b.0)));
        users.into_iter().map(|(id, _)| *id).collect()
    }

    /// Current standings without round details.
    pub fn standings(&self) -> Vec<Standing> {
        self.overall_order()
            .into_iter()
            .enumerate()
            .map(|(index, user_id)| Standing {
                user_id,
                round_score: None,
                round_placement: None,
                round_points: 0,
                total_points: self.tallies.get(&user_id).map_or(0, |t| t.total_points),
                placement: index as u32 + 1,
                life: None,
            })
            .collect()
    }

    pub fn final_placements(&self) -> Vec<FinalPlacement> {
        self.overall_order()
            .into_iter()
            .enumerate()
            .map(|(index, user_id)| FinalPlacement {
                user_id,
                placement: index as u32 + 1,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(points: &[u32]) -> MatchConfig {
        MatchConfig {
            points: points.to_vec(),
            ..MatchConfig::default()
        }
    }

    #[test]
    fn test_rank_by_score_orders_descending() {
        let ranked = rank_by_score(&[(UserId(1), 1000), (UserId(2), 500), (UserId(3), 750)]);
        assert_eq!(
            ranked,
            vec![(UserId(1), 1000, 1), (UserId(3), 750, 2), (UserId(2), 500, 3)]
        );
    }

    #[test]
    fn test_rank_by_score_ties_share_placement() {
        let ranked = rank_by_score(&[
            (UserId(4), 10),
            (UserId(2), 30),
            (UserId(3), 30),
            (UserId(1), 20),
        ]);
        let placements: Vec<u32> = ranked.iter().map(|r| r.2).collect();
        assert_eq!(placements, vec![1, 1, 3, 4]);
        assert_eq!(ranked[0].0, UserId(2));
    }

    #[test]
    fn test_record_round_awards_points_by_placement() {
        let config = table(&[8, 7, 6, 5, 4, 3, 2, 1]);
        let mut board = ScoreBoard::new();

        let standings =
            board.record_round(&[(UserId(1), 1000), (UserId(2), 500), (UserId(3), 750)], &config);

        let summary: Vec<(UserId, u32, Option<u32>, u32)> = standings
            .iter()
            .map(|s| (s.user_id, s.round_points, s.round_placement, s.placement))
            .collect();
        assert_eq!(
            summary,
            vec![
                (UserId(1), 8, Some(1), 1),
                (UserId(3), 7, Some(2), 2),
                (UserId(2), 6, Some(3), 3),
            ]
        );
    }

    #[test]
    fn test_record_round_equal_scores_get_equal_points() {
        let config = MatchConfig::default();
        let mut board = ScoreBoard::new();

        board.record_round(&[(UserId(1), 500), (UserId(2), 500), (UserId(3), 100)], &config);

        assert_eq!(board.tally(UserId(1)).unwrap().total_points, 15);
        assert_eq!(board.tally(UserId(2)).unwrap().total_points, 15);
        assert_eq!(board.tally(UserId(3)).unwrap().total_points, 10);
    }

    #[test]
    fn test_record_round_user_without_score_gets_nothing() {
        let config = MatchConfig::default();
        let mut board = ScoreBoard::new();
        board.add_user(UserId(9));

        let standings = board.record_round(&[(UserId(1), 500)], &config);

        let missing = standings.iter().find(|s| s.user_id == UserId(9)).unwrap();
        assert_eq!(missing.round_score, None);
        assert_eq!(missing.round_placement, None);
        assert_eq!(missing.total_points, 0);
        assert_eq!(missing.placement, 2);
    }

    #[test]
    fn test_overall_order_breaks_point_ties_by_histogram() {
        // First and second place are worth the same, so only the histogram
        // separates the two users.
        let config = table(&[5, 5, 1]);
        let mut board = ScoreBoard::new();

        board.record_round(&[(UserId(1), 200), (UserId(2), 300)], &config);

        assert_eq!(board.tally(UserId(1)).unwrap().total_points, 5);
        assert_eq!(board.tally(UserId(2)).unwrap().total_points, 5);
        assert_eq!(board.overall_order(), vec![UserId(2), UserId(1)]);
    }

    #[test]
    fn test_overall_order_prefers_points_over_histogram() {
        let config = table(&[10, 6, 4]);
        let mut board = ScoreBoard::new();

        board.record_round(&[(UserId(1), 300), (UserId(2), 100), (UserId(3), 200)], &config);
        board.record_round(&[(UserId(1), 200), (UserId(2), 300), (UserId(3), 100)], &config);

        // u1: 10 + 6, u2: 4 + 10, u3: 6 + 4
        assert_eq!(board.overall_order(), vec![UserId(1), UserId(2), UserId(3)]);
    }

    #[test]
    fn test_overall_order_falls_back_to_user_id() {
        let config = MatchConfig::default();
        let mut board = ScoreBoard::new();

        board.record_round(&[(UserId(5), 100), (UserId(3), 100)], &config);

        assert_eq!(board.overall_order(), vec![UserId(3), UserId(5)]);
        let placements = board.final_placements();
        assert_eq!(placements[0], FinalPlacement { user_id: UserId(3), placement: 1 });
        assert_eq!(placements[1], FinalPlacement { user_id: UserId(5), placement: 2 });
    }

    #[test]
    fn test_cumulative_points_sum_rounds() {
        let config = table(&[8, 7]);
        let mut board = ScoreBoard::new();

        board.record_round(&[(UserId(1), 10), (UserId(2), 20)], &config);
        board.record_round(&[(UserId(1), 30), (UserId(2), 20)], &config);

        assert_eq!(board.tally(UserId(1)).unwrap().total_points, 15);
        assert_eq!(board.tally(UserId(2)).unwrap().total_points, 15);
        assert_eq!(board.tally(UserId(1)).unwrap().histogram, vec![1, 1]);
    }

    #[test]
    fn test_competition_placements() {
        let lives = [900u64, 900, 500, 0];
        assert_eq!(competition_placements(&lives, |l| *l), vec![1, 1, 3, 4]);
    }
}
