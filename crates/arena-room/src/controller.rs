//! The stage controller interface and the closed set of match modes.

use arena_protocol::{ItemId, MatchMode, Stage, Standing, UserAction, UserId};

use crate::card_battle::CardBattle;
use crate::context::STAGE_COUNTDOWN;
use crate::round_tournament::RoundTournament;
use crate::{MatchContext, RoomError};

/// The mode-specific half of a match.
///
/// Every method runs with the room locked. The stages both modes share
/// (finish selection, gameplay warmup, gameplay, the close delay after
/// `Ended`) are driven by [`MatchContext`]; an implementation handles
/// joins and leaves, its own selection stages, scoring, and what happens
/// after results.
pub trait MatchController: Send {
    /// Called once when the room is created.
    fn initialise(&mut self, ctx: &mut MatchContext);

    fn handle_user_joined(&mut self, ctx: &mut MatchContext, user_id: UserId);

    /// Called after the user has been removed from `ctx`.
    fn handle_user_left(&mut self, ctx: &mut MatchContext, user_id: UserId);

    /// Handles a mode-specific action. Ready and availability changes never
    /// reach this method.
    fn handle_user_action(
        &mut self,
        ctx: &mut MatchContext,
        user_id: UserId,
        action: UserAction,
    ) -> Result<(), RoomError>;

    /// Scores the finished gameplay and moves on to results. `results`
    /// holds every participant and their score, if they submitted one.
    fn handle_gameplay_completed(
        &mut self,
        ctx: &mut MatchContext,
        results: &[(UserId, Option<u64>)],
    );

    /// The stage timer for `stage` ran out (or was skipped).
    fn on_countdown_elapsed(&mut self, ctx: &mut MatchContext, stage: Stage);

    fn standings(&self, ctx: &MatchContext) -> Vec<Standing>;
}

/// Whichever controller drives a room.
pub enum StageController {
    RoundTournament(RoundTournament),
    CardBattle(CardBattle),
}

impl StageController {
    pub fn new(mode: MatchMode) -> Self {
        match mode {
            MatchMode::RoundTournament => Self::RoundTournament(RoundTournament::new()),
            MatchMode::CardBattle => Self::CardBattle(CardBattle::new()),
        }
    }

    pub fn mode(&self) -> MatchMode {
        match self {
            Self::RoundTournament(_) => MatchMode::RoundTournament,
            Self::CardBattle(_) => MatchMode::CardBattle,
        }
    }

    fn inner(&self) -> &dyn MatchController {
        match self {
            Self::RoundTournament(c) => c,
            Self::CardBattle(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn MatchController {
        match self {
            Self::RoundTournament(c) => c,
            Self::CardBattle(c) => c,
        }
    }

    pub fn initialise(&mut self, ctx: &mut MatchContext) {
        self.inner_mut().initialise(ctx);
    }

    pub fn handle_user_joined(&mut self, ctx: &mut MatchContext, user_id: UserId) {
        self.inner_mut().handle_user_joined(ctx, user_id);
    }

    pub fn handle_user_left(&mut self, ctx: &mut MatchContext, user_id: UserId) {
        self.inner_mut().handle_user_left(ctx, user_id);
    }

    pub fn handle_user_action(
        &mut self,
        ctx: &mut MatchContext,
        user_id: UserId,
        action: UserAction,
    ) -> Result<(), RoomError> {
        match action {
            UserAction::SetReady { ready } => ctx.set_user_state(user_id, Some(ready), None),
            UserAction::SetAvailability { available } => {
                ctx.set_user_state(user_id, None, Some(available))
            }
            action => self.inner_mut().handle_user_action(ctx, user_id, action),
        }
    }

    /// Validates that `item_id` is the gameplay currently running, then
    /// hands the scores to the controller.
    pub fn handle_gameplay_completed(
        &mut self,
        ctx: &mut MatchContext,
        item_id: ItemId,
        scores: &[(UserId, u64)],
    ) -> Result<(), RoomError> {
        let results = ctx.finish_gameplay(item_id, scores)?;
        tracing::info!(
            room_id = %ctx.room_id(),
            %item_id,
            round = ctx.round(),
            scores = results.iter().filter(|(_, s)| s.is_some()).count(),
            "gameplay completed"
        );
        self.inner_mut().handle_gameplay_completed(ctx, &results);
        Ok(())
    }

    /// Finishes the running stage timer early. In gameplay warmup with no
    /// timer left (everyone is waited on) it starts gameplay with whoever
    /// is present.
    pub fn skip_to_next_stage(&mut self, ctx: &mut MatchContext) -> Result<(), RoomError> {
        if ctx.countdowns.finish(STAGE_COUNTDOWN) {
            return Ok(());
        }
        if ctx.stage() == Stage::GameplayWarmup && ctx.try_start_gameplay(true) {
            return Ok(());
        }
        Err(RoomError::invalid(format!(
            "nothing to skip in stage {}",
            ctx.stage()
        )))
    }

    pub fn on_countdown_elapsed(&mut self, ctx: &mut MatchContext, stage: Stage) {
        if ctx.stage() != stage {
            tracing::debug!(
                room_id = %ctx.room_id(),
                %stage,
                current = %ctx.stage(),
                "stale stage countdown ignored"
            );
            return;
        }
        if !ctx.shared_countdown_elapsed(stage) {
            self.inner_mut().on_countdown_elapsed(ctx, stage);
        }
    }

    pub fn standings(&self, ctx: &MatchContext) -> Vec<Standing> {
        self.inner().standings(ctx)
    }
}
