//! Card battle: each round one active user plays a card from their hand,
//! everyone plays the card's item, and the score gap turns into damage.
//! The match ends when someone's life reaches zero.

use std::collections::{BTreeMap, HashMap, HashSet};

use arena_protocol::{
    Card, CardId, FinalPlacement, MatchEvent, PlaylistItem, Stage, Standing, UserAction, UserId,
};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::scoring::{competition_placements, rank_by_score};
use crate::{MatchContext, MatchController, RoomError};

pub struct CardBattle {
    lives: BTreeMap<UserId, u64>,
    hands: HashMap<UserId, Vec<Card>>,
    /// Shuffled once when the match starts. Users who left are skipped.
    turn_order: Vec<UserId>,
    turn: usize,
    active_user: Option<UserId>,
    /// Users who have discarded this round.
    discarded: HashSet<UserId>,
    next_card_id: u32,
    started: bool,
}

impl CardBattle {
    pub fn new() -> Self {
        Self {
            lives: BTreeMap::new(),
            hands: HashMap::new(),
            turn_order: Vec::new(),
            turn: 0,
            active_user: None,
            discarded: HashSet::new(),
            next_card_id: 0,
            started: false,
        }
    }

    pub fn life(&self, user_id: UserId) -> Option<u64> {
        self.lives.get(&user_id).copied()
    }

    pub fn hand(&self, user_id: UserId) -> &[Card] {
        self.hands.get(&user_id).map_or(&[], Vec::as_slice)
    }

    pub fn active_user(&self) -> Option<UserId> {
        self.active_user
    }

    pub fn turn_order(&self) -> &[UserId] {
        &self.turn_order
    }

    // ---- Setup ----

    fn start_match(&mut self, ctx: &mut MatchContext) {
        self.turn_order = ctx.user_ids();
        self.turn_order.shuffle(&mut ctx.rng);
        for user_id in self.turn_order.clone() {
            self.enrol(ctx, user_id);
        }
        self.started = true;
        tracing::info!(
            room_id = %ctx.room_id(),
            turn_order = ?self.turn_order,
            "match starting"
        );
        ctx.enter_round_warmup();
    }

    /// Gives a user their starting life and hand.
    fn enrol(&mut self, ctx: &mut MatchContext, user_id: UserId) {
        self.lives.entry(user_id).or_insert(ctx.config().starting_life);
        self.refill_hand(ctx, user_id);
    }

    /// Drops cards for items already played and draws up to the hand size.
    /// Sends the hand to its owner.
    fn refill_hand(&mut self, ctx: &mut MatchContext, user_id: UserId) {
        let unplayed = ctx.unplayed_items();
        let hand = self.hands.entry(user_id).or_default();
        hand.retain(|card| unplayed.iter().any(|i| i.id == card.item_id));
        while hand.len() < ctx.config().hand_size {
            match draw(&mut self.next_card_id, &unplayed, ctx) {
                Some(card) => hand.push(card),
                None => break,
            }
        }
        ctx.send_to(user_id, MatchEvent::HandUpdated { cards: hand.clone() });
    }

    // ---- Stages ----

    fn enter_discard(&mut self, ctx: &mut MatchContext) {
        for user_id in ctx.user_ids() {
            self.refill_hand(ctx, user_id);
        }

        self.discarded.clear();
        if !self.pick_active_user(ctx) {
            return;
        }
        ctx.change_stage(Stage::CardDiscard);
        ctx.start_countdown(ctx.config().card_discard);
    }

    /// Hands the turn to the next eligible user and announces it. Ends the
    /// match and returns `false` when nobody is left to take it.
    fn pick_active_user(&mut self, ctx: &mut MatchContext) -> bool {
        let Some(active) = self.next_active_user(ctx) else {
            self.end(ctx);
            return false;
        };
        self.active_user = Some(active);
        tracing::debug!(room_id = %ctx.room_id(), user_id = %active, "active user");
        ctx.broadcast(MatchEvent::ActiveUserChanged { user_id: active });
        true
    }

    /// The next user in turn order who is present and still alive,
    /// starting from the current turn.
    fn next_active_user(&mut self, ctx: &MatchContext) -> Option<UserId> {
        let len = self.turn_order.len();
        let index = (0..len)
            .map(|offset| (self.turn + offset) % len)
            .find(|&index| {
                let user_id = self.turn_order[index];
                ctx.contains_user(user_id) && self.life(user_id).is_some_and(|l| l > 0)
            })?;
        self.turn = index;
        Some(self.turn_order[index])
    }

    fn enter_play(&mut self, ctx: &mut MatchContext) {
        ctx.change_stage(Stage::CardPlay);
        ctx.start_countdown(ctx.config().card_play);
    }

    fn everyone_discarded(&self, ctx: &MatchContext) -> bool {
        !ctx.users().is_empty()
            && ctx
                .users()
                .iter()
                .all(|u| self.discarded.contains(&u.user_id))
    }

    fn play_card(&mut self, ctx: &mut MatchContext, user_id: UserId, card: Card) {
        if let Some(hand) = self.hands.get_mut(&user_id) {
            hand.retain(|c| c.id != card.id);
            ctx.send_to(user_id, MatchEvent::HandUpdated { cards: hand.clone() });
        }
        tracing::info!(room_id = %ctx.room_id(), %user_id, card = %card.id, item = %card.item_id,
            "card played");
        ctx.broadcast(MatchEvent::CardPlayed { user_id, card });
        ctx.select_item(card.item_id);
    }

    /// Plays a random card for the active user when they ran out of time
    /// or left.
    fn auto_play(&mut self, ctx: &mut MatchContext) {
        let Some(user_id) = self.active_user else {
            self.end(ctx);
            return;
        };
        let hand = self.hand(user_id);
        let card = if hand.is_empty() {
            let unplayed = ctx.unplayed_items();
            draw(&mut self.next_card_id, &unplayed, ctx)
        } else {
            Some(hand[ctx.rng.random_range(0..hand.len())])
        };
        match card {
            Some(card) => self.play_card(ctx, user_id, card),
            None => self.end(ctx),
        }
    }

    fn continue_or_end(&mut self, ctx: &mut MatchContext) {
        let someone_dead = self.lives.values().any(|life| *life == 0);
        if someone_dead || ctx.users().len() < 2 || ctx.unplayed_items().is_empty() {
            self.end(ctx);
            return;
        }
        self.turn = (self.turn + 1) % self.turn_order.len().max(1);
        ctx.enter_round_warmup();
    }

    fn end(&mut self, ctx: &mut MatchContext) {
        self.active_user = None;
        let placements = self.final_placements(ctx);
        ctx.end_match(placements);
    }

    /// Present users ranked by remaining life, then users who left.
    fn final_placements(&self, ctx: &MatchContext) -> Vec<FinalPlacement> {
        let mut entries: Vec<(UserId, bool, u64)> = self
            .lives
            .iter()
            .map(|(id, life)| (*id, ctx.contains_user(*id), *life))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));

        let placements = competition_placements(&entries, |e| (e.1, e.2));
        entries
            .iter()
            .zip(placements)
            .map(|(entry, placement)| FinalPlacement {
                user_id: entry.0,
                placement,
            })
            .collect()
    }

    fn life_standings(&self, round: &HashMap<UserId, (u64, u32)>) -> Vec<Standing> {
        let mut entries: Vec<(UserId, u64)> = self.lives.iter().map(|(id, l)| (*id, *l)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let placements = competition_placements(&entries, |e| e.1);

        entries
            .into_iter()
            .zip(placements)
            .map(|((user_id, life), placement)| {
                let this_round = round.get(&user_id);
                Standing {
                    user_id,
                    round_score: this_round.map(|r| r.0),
                    round_placement: this_round.map(|r| r.1),
                    round_points: 0,
                    total_points: 0,
                    placement,
                    life: Some(life),
                }
            })
            .collect()
    }
}

impl Default for CardBattle {
    fn default() -> Self {
        Self::new()
    }
}

/// Draws a fresh card for a random unplayed item.
fn draw(next_card_id: &mut u32, unplayed: &[PlaylistItem], ctx: &mut MatchContext) -> Option<Card> {
    if unplayed.is_empty() {
        return None;
    }
    let item = unplayed[ctx.rng.random_range(0..unplayed.len())];
    *next_card_id += 1;
    Some(Card {
        id: CardId(*next_card_id),
        item_id: item.id,
    })
}

impl MatchController for CardBattle {
    fn initialise(&mut self, ctx: &mut MatchContext) {
        ctx.change_stage(Stage::WaitForJoin);
    }

    fn handle_user_joined(&mut self, ctx: &mut MatchContext, user_id: UserId) {
        if !self.started {
            if ctx.stage() == Stage::WaitForJoin && ctx.all_required_joined() {
                self.start_match(ctx);
            }
            return;
        }
        if !self.turn_order.contains(&user_id) {
            self.turn_order.push(user_id);
        }
        // Rejoining users get their hand back; newcomers get a fresh one.
        self.enrol(ctx, user_id);
    }

    fn handle_user_left(&mut self, ctx: &mut MatchContext, user_id: UserId) {
        self.discarded.remove(&user_id);
        if !self.started || ctx.stage().is_terminal() {
            return;
        }
        if ctx.users().len() < 2 {
            tracing::info!(room_id = %ctx.room_id(), "not enough users left to continue");
            self.end(ctx);
            return;
        }
        match ctx.stage() {
            Stage::CardDiscard => {
                // The turn passes on now so card play never waits on an
                // absent user.
                if self.active_user == Some(user_id) && !self.pick_active_user(ctx) {
                    return;
                }
                if self.everyone_discarded(ctx) {
                    self.enter_play(ctx);
                }
            }
            Stage::CardPlay if self.active_user == Some(user_id) => self.auto_play(ctx),
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
        match action {
            UserAction::DiscardCards { card_ids } => {
                if ctx.stage() != Stage::CardDiscard {
                    return Err(RoomError::invalid(format!(
                        "cannot discard in stage {}",
                        ctx.stage()
                    )));
                }
                if self.discarded.contains(&user_id) {
                    return Err(RoomError::invalid("already discarded this round"));
                }
                let hand = self.hand(user_id);
                let unique: HashSet<CardId> = card_ids.iter().copied().collect();
                if unique.len() != card_ids.len() {
                    return Err(RoomError::invalid("a card was listed twice"));
                }
                if let Some(missing) = card_ids.iter().find(|id| !hand.iter().any(|c| c.id == **id)) {
                    return Err(RoomError::invalid(format!("card {missing} is not in hand")));
                }

                if let Some(hand) = self.hands.get_mut(&user_id) {
                    hand.retain(|c| !unique.contains(&c.id));
                }
                self.refill_hand(ctx, user_id);
                self.discarded.insert(user_id);
                ctx.broadcast(MatchEvent::CardsDiscarded {
                    user_id,
                    count: card_ids.len(),
                });

                if self.everyone_discarded(ctx) {
                    self.enter_play(ctx);
                }
                Ok(())
            }
            UserAction::PlayCard { card_id } => {
                if ctx.stage() != Stage::CardPlay {
                    return Err(RoomError::invalid(format!(
                        "cannot play a card in stage {}",
                        ctx.stage()
                    )));
                }
                if self.active_user != Some(user_id) {
                    return Err(RoomError::invalid("only the active user may play a card"));
                }
                let card = self
                    .hand(user_id)
                    .iter()
                    .find(|c| c.id == card_id)
                    .copied()
                    .ok_or_else(|| RoomError::invalid(format!("card {card_id} is not in hand")))?;
                self.play_card(ctx, user_id, card);
                Ok(())
            }
            _ => Err(RoomError::invalid("action is not available in a card battle")),
        }
    }

    fn handle_gameplay_completed(
        &mut self,
        ctx: &mut MatchContext,
        results: &[(UserId, Option<u64>)],
    ) {
        // Participants still present and alive; a missing score counts as 0.
        let scores: Vec<(UserId, u64)> = results
            .iter()
            .filter(|(id, _)| ctx.contains_user(*id) && self.life(*id).is_some_and(|l| l > 0))
            .map(|(id, score)| (*id, score.unwrap_or(0)))
            .collect();
        let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);

        let reference = ctx.config().reference_difficulty;
        let difficulty = ctx
            .current_item()
            .and_then(|id| ctx.item(id))
            .map_or(reference, |item| item.difficulty);

        for (user_id, score) in &scores {
            let damage = ((best - score) as f64 * difficulty / reference).round().max(0.0) as u64;
            if damage == 0 {
                continue;
            }
            let Some(life) = self.lives.get_mut(user_id) else {
                continue;
            };
            *life = life.saturating_sub(damage);
            tracing::debug!(room_id = %ctx.room_id(), %user_id, damage, life = *life, "damage dealt");
            ctx.broadcast(MatchEvent::LifeChanged {
                user_id: *user_id,
                damage,
                life: *life,
            });
        }

        let round: HashMap<UserId, (u64, u32)> = rank_by_score(&scores)
            .into_iter()
            .map(|(id, score, placement)| (id, (score, placement)))
            .collect();
        ctx.broadcast(MatchEvent::RoundResults {
            round: ctx.round(),
            standings: self.life_standings(&round),
        });
        ctx.enter_results();
    }

    fn on_countdown_elapsed(&mut self, ctx: &mut MatchContext, stage: Stage) {
        match stage {
            Stage::RoundWarmup => self.enter_discard(ctx),
            Stage::CardDiscard => self.enter_play(ctx),
            Stage::CardPlay => self.auto_play(ctx),
            Stage::Results => self.continue_or_end(ctx),
            _ => {}
        }
    }

    fn standings(&self, _ctx: &MatchContext) -> Vec<Standing> {
        self.life_standings(&HashMap::new())
    }
}
