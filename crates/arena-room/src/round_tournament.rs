//! Round tournament: a fixed number of rounds, each on an item the users
//! vote for, scored by placement points.

use std::collections::BTreeMap;

use arena_protocol::{ItemId, MatchEvent, PlaylistItem, Stage, Standing, UserAction, UserId};

use crate::scoring::ScoreBoard;
use crate::selection::pick_near;
use crate::{MatchContext, MatchController, RoomError};

pub struct RoundTournament {
    /// This round's votes. A user may change their vote until selection
    /// ends.
    votes: BTreeMap<UserId, ItemId>,
    scores: ScoreBoard,
}

impl RoundTournament {
    pub fn new() -> Self {
        Self {
            votes: BTreeMap::new(),
            scores: ScoreBoard::new(),
        }
    }

    pub fn votes(&self) -> &BTreeMap<UserId, ItemId> {
        &self.votes
    }

    pub fn scores(&self) -> &ScoreBoard {
        &self.scores
    }

    fn enter_selection(&mut self, ctx: &mut MatchContext) {
        if ctx.unplayed_items().is_empty() {
            tracing::info!(room_id = %ctx.room_id(), "playlist exhausted");
            self.end(ctx);
            return;
        }
        self.votes.clear();
        ctx.change_stage(Stage::BeatmapSelect);
        ctx.start_countdown(ctx.config().beatmap_select);
    }

    fn everyone_voted(&self, ctx: &MatchContext) -> bool {
        !ctx.users().is_empty()
            && ctx
                .users()
                .iter()
                .all(|u| self.votes.contains_key(&u.user_id))
    }

    /// Picks among the most-voted items (every unplayed item when nobody
    /// voted), weighted toward the lowest rating in the room.
    fn finish_selection(&mut self, ctx: &mut MatchContext) {
        let unplayed = ctx.unplayed_items();

        let mut tally: BTreeMap<ItemId, usize> = BTreeMap::new();
        for item_id in self.votes.values() {
            *tally.entry(*item_id).or_default() += 1;
        }
        let most = tally.values().copied().max().unwrap_or(0);
        let candidates: Vec<PlaylistItem> = if most == 0 {
            unplayed
        } else {
            unplayed
                .into_iter()
                .filter(|item| tally.get(&item.id) == Some(&most))
                .collect()
        };

        let target = ctx.lowest_mu();
        let spread = ctx.config().selection_spread;
        match pick_near(&candidates, target, spread, &mut ctx.rng) {
            Some(item) => ctx.select_item(item.id),
            None => self.end(ctx),
        }
    }

    fn end(&mut self, ctx: &mut MatchContext) {
        ctx.end_match(self.scores.final_placements());
    }
}

impl Default for RoundTournament {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchController for RoundTournament {
    fn initialise(&mut self, ctx: &mut MatchContext) {
        ctx.change_stage(Stage::WaitForJoin);
    }

    fn handle_user_joined(&mut self, ctx: &mut MatchContext, user_id: UserId) {
        self.scores.add_user(user_id);
        if ctx.stage() == Stage::WaitForJoin && ctx.all_required_joined() {
            tracing::info!(room_id = %ctx.room_id(), users = ctx.users().len(), "match starting");
            ctx.enter_round_warmup();
        }
    }

    fn handle_user_left(&mut self, ctx: &mut MatchContext, user_id: UserId) {
        self.votes.remove(&user_id);
        match ctx.stage() {
            Stage::BeatmapSelect if !self.votes.is_empty() && self.everyone_voted(ctx) => {
                self.finish_selection(ctx);
            }
            Stage::GameplayWarmup => {
                ctx.try_start_gameplay(false);
            }
            _ => {}
        }
    }

    fn handle_user_action(
        &mut self,
        ctx: &mut MatchContext,
        user_id: UserId,
        action: UserAction,
    ) -> Result<(), RoomError> {
        let UserAction::VoteItem { item_id } = action else {
            return Err(RoomError::invalid("action is not available in a round tournament"));
        };
        if ctx.stage() != Stage::BeatmapSelect {
            return Err(RoomError::invalid(format!(
                "cannot vote in stage {}",
                ctx.stage()
            )));
        }
        if ctx.item(item_id).is_none() || ctx.played_items().contains(&item_id) {
            return Err(RoomError::invalid(format!("item {item_id} is not available")));
        }

        self.votes.insert(user_id, item_id);
        tracing::debug!(room_id = %ctx.room_id(), %user_id, %item_id, "vote recorded");
        ctx.broadcast(MatchEvent::ItemVoted { user_id, item_id });

        if self.everyone_voted(ctx) {
            self.finish_selection(ctx);
        }
        Ok(())
    }

    fn handle_gameplay_completed(
        &mut self,
        ctx: &mut MatchContext,
        results: &[(UserId, Option<u64>)],
    ) {
        let scores: Vec<(UserId, u64)> = results
            .iter()
            .filter_map(|(id, score)| score.map(|s| (*id, s)))
            .collect();
        let standings = self.scores.record_round(&scores, ctx.config());
        ctx.broadcast(MatchEvent::RoundResults {
            round: ctx.round(),
            standings,
        });
        ctx.enter_results();
    }

    fn on_countdown_elapsed(&mut self, ctx: &mut MatchContext, stage: Stage) {
        match stage {
            Stage::RoundWarmup => self.enter_selection(ctx),
            Stage::BeatmapSelect => self.finish_selection(ctx),
            Stage::Results => {
                let more_rounds = ctx.round() < ctx.config().rounds;
                if more_rounds && !ctx.users().is_empty() && !ctx.unplayed_items().is_empty() {
                    ctx.enter_round_warmup();
                } else {
                    self.end(ctx);
                }
            }
            _ => {}
        }
    }

    fn standings(&self, _ctx: &MatchContext) -> Vec<Standing> {
        self.scores.standings()
    }
}
