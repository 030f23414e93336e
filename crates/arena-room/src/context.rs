//! Room state shared by every stage controller, and the stage steps both
//! controllers have in common.

use std::sync::Arc;
use std::time::Duration;

use arena_protocol::{
    CountdownView, FinalPlacement, ItemId, MatchEvent, MatchMode, PlaylistItem, PoolId, Rating,
    Recipient, RoomId, Stage, UserId,
};
use arena_tick::{CountdownClass, CountdownInfo, Countdowns};
use rand::rngs::StdRng;

use crate::{MatchConfig, Outbound, OutboundSender, Room, RoomError, RoomUser};

/// Exclusivity class of the per-stage timer. A room has at most one.
pub const STAGE_COUNTDOWN: CountdownClass = CountdownClass("stage");

pub(crate) fn countdown_view(info: &CountdownInfo<Stage>) -> CountdownView {
    CountdownView {
        id: info.id,
        stage: info.tag,
        remaining_ms: info.remaining.as_millis() as u64,
    }
}

/// Everything in a room except its controller.
///
/// Controllers receive `&mut MatchContext` next to `&mut self`, which lets
/// a controller mutate room state, start countdowns and emit events
/// without borrowing the whole [`Room`].
pub struct MatchContext {
    pub(crate) room_id: RoomId,
    pub(crate) mode: MatchMode,
    pub(crate) pool_id: PoolId,
    pub(crate) playlist: Vec<PlaylistItem>,
    pub(crate) required_users: Vec<UserId>,
    /// Users currently in the room, in join order.
    pub(crate) users: Vec<RoomUser>,
    pub(crate) config: Arc<MatchConfig>,
    pub(crate) countdowns: Countdowns<Room>,
    pub(crate) rng: StdRng,
    outbox: OutboundSender,
    stage: Stage,
    round: u32,
    current_item: Option<ItemId>,
    played_items: Vec<ItemId>,
    /// The gameplay warmup countdown has run out; gameplay now starts as
    /// soon as everyone is ready.
    warmup_elapsed: bool,
    /// Users taking part in the running gameplay. Empty when none runs.
    gameplay_users: Vec<UserId>,
}

impl MatchContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        room_id: RoomId,
        mode: MatchMode,
        pool_id: PoolId,
        playlist: Vec<PlaylistItem>,
        required_users: Vec<UserId>,
        config: Arc<MatchConfig>,
        countdowns: Countdowns<Room>,
        rng: StdRng,
        outbox: OutboundSender,
    ) -> Self {
        Self {
            room_id,
            mode,
            pool_id,
            playlist,
            required_users,
            users: Vec::new(),
            config,
            countdowns,
            rng,
            outbox,
            stage: Stage::WaitForJoin,
            round: 0,
            current_item: None,
            played_items: Vec::new(),
            warmup_elapsed: false,
            gameplay_users: Vec::new(),
        }
    }

    // ---- Queries ----

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// 1-based round number; 0 before the first round.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn users(&self) -> &[RoomUser] {
        &self.users
    }

    pub fn user(&self, user_id: UserId) -> Option<&RoomUser> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.user(user_id).is_some()
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|u| u.user_id).collect()
    }

    pub fn required_users(&self) -> &[UserId] {
        &self.required_users
    }

    pub fn playlist(&self) -> &[PlaylistItem] {
        &self.playlist
    }

    pub fn current_item(&self) -> Option<ItemId> {
        self.current_item
    }

    pub fn played_items(&self) -> &[ItemId] {
        &self.played_items
    }

    pub fn gameplay_users(&self) -> &[UserId] {
        &self.gameplay_users
    }

    pub fn is_gameplay_running(&self) -> bool {
        !self.gameplay_users.is_empty()
    }

    pub fn item(&self, item_id: ItemId) -> Option<&PlaylistItem> {
        self.playlist.iter().find(|i| i.id == item_id)
    }

    /// Playlist items that have not been played in this match.
    pub fn unplayed_items(&self) -> Vec<PlaylistItem> {
        self.playlist
            .iter()
            .filter(|i| !self.played_items.contains(&i.id))
            .copied()
            .collect()
    }

    /// Lowest rating mean among the users present.
    pub fn lowest_mu(&self) -> f64 {
        self.users
            .iter()
            .map(|u| u.rating.mu)
            .reduce(f64::min)
            .unwrap_or(Rating::INITIAL_MU)
    }

    /// Every required user is present (or, with no required list, at least
    /// one user is).
    pub fn all_required_joined(&self) -> bool {
        !self.users.is_empty() && self.required_users.iter().all(|id| self.contains_user(*id))
    }

    pub fn countdown(&self) -> Option<CountdownView> {
        self.countdowns
            .get(STAGE_COUNTDOWN)
            .filter(|c| c.is_running())
            .map(|c| countdown_view(&c.info()))
    }

    // ---- Effects ----

    pub(crate) fn push(&self, outbound: Outbound) {
        if self.outbox.send(outbound).is_err() {
            tracing::debug!(room_id = %self.room_id, "outbound channel closed, effect dropped");
        }
    }

    pub(crate) fn emit(&self, recipient: Recipient, event: MatchEvent) {
        self.push(Outbound::Event {
            room_id: self.room_id,
            recipient,
            event,
        });
    }

    pub(crate) fn broadcast(&self, event: MatchEvent) {
        self.emit(Recipient::All, event);
    }

    pub(crate) fn send_to(&self, user_id: UserId, event: MatchEvent) {
        self.emit(Recipient::User(user_id), event);
    }

    // ---- Stage plumbing ----

    pub(crate) fn change_stage(&mut self, stage: Stage) {
        let previous = self.stage;
        self.stage = stage;
        tracing::info!(
            room_id = %self.room_id,
            from = %previous,
            to = %stage,
            round = self.round,
            "stage changed"
        );
        self.broadcast(MatchEvent::StageChanged {
            stage,
            round: self.round,
        });
    }

    /// Starts the stage timer for the current stage. When it elapses the
    /// room's controller gets `on_countdown_elapsed` for that stage.
    pub(crate) fn start_countdown(&mut self, duration: Duration) {
        let stage = self.stage;
        let info = self.countdowns.start(
            STAGE_COUNTDOWN,
            stage,
            duration,
            Box::new(move |room: &mut Room| room.countdown_elapsed(stage)),
        );
        self.broadcast(MatchEvent::CountdownChanged {
            countdown: Some(countdown_view(&info)),
        });
    }

    // ---- Shared stages ----

    /// Starts the next round with its warmup.
    pub(crate) fn enter_round_warmup(&mut self) {
        self.round += 1;
        self.current_item = None;
        self.change_stage(Stage::RoundWarmup);
        self.start_countdown(self.config.round_warmup);
    }

    /// Fixes the item for this round and moves to `FinishSelection`.
    pub(crate) fn select_item(&mut self, item_id: ItemId) {
        self.current_item = Some(item_id);
        tracing::info!(room_id = %self.room_id, %item_id, round = self.round, "item selected");
        self.broadcast(MatchEvent::ItemSelected { item_id });
        self.change_stage(Stage::FinishSelection);
        self.start_countdown(self.config.finish_selection);
    }

    fn enter_gameplay_warmup(&mut self) {
        self.warmup_elapsed = false;
        for index in 0..self.users.len() {
            if self.users[index].ready {
                self.users[index].ready = false;
                let user = &self.users[index];
                self.broadcast(MatchEvent::UserStateChanged {
                    user_id: user.user_id,
                    ready: user.ready,
                    available: user.available,
                });
            }
        }
        self.change_stage(Stage::GameplayWarmup);
        self.start_countdown(self.config.gameplay_warmup);
    }

    /// Updates a user's ready/available flags. During gameplay warmup this
    /// may start gameplay.
    pub(crate) fn set_user_state(
        &mut self,
        user_id: UserId,
        ready: Option<bool>,
        available: Option<bool>,
    ) -> Result<(), RoomError> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.user_id == user_id)
            .ok_or(RoomError::NotInRoom(user_id, self.room_id))?;
        if let Some(ready) = ready {
            user.ready = ready;
        }
        if let Some(available) = available {
            user.available = available;
        }
        let event = MatchEvent::UserStateChanged {
            user_id,
            ready: user.ready,
            available: user.available,
        };
        self.broadcast(event);

        if self.stage == Stage::GameplayWarmup {
            self.try_start_gameplay(false);
        }
        Ok(())
    }

    /// Moves from gameplay warmup to gameplay once the warmup has elapsed
    /// and every user present is ready with the item available. `force`
    /// skips both conditions. Returns whether gameplay was started.
    pub(crate) fn try_start_gameplay(&mut self, force: bool) -> bool {
        if self.stage != Stage::GameplayWarmup || self.users.is_empty() {
            return false;
        }
        if !force {
            let everyone_ready = self.users.iter().all(|u| u.ready && u.available);
            if !(self.warmup_elapsed && everyone_ready) {
                return false;
            }
        }
        self.change_stage(Stage::Gameplay);
        // Nominal zero-length timer; gameplay starts when it fires.
        self.start_countdown(Duration::ZERO);
        true
    }

    fn begin_gameplay(&mut self) {
        let Some(item_id) = self.current_item else {
            tracing::warn!(room_id = %self.room_id, "gameplay stage without an item");
            return;
        };
        self.gameplay_users = self.user_ids();
        for user in &mut self.users {
            user.playing = true;
        }
        self.played_items.push(item_id);
        tracing::info!(
            room_id = %self.room_id,
            %item_id,
            users = self.gameplay_users.len(),
            "gameplay started"
        );
        self.push(Outbound::RecordPlayedItem {
            room_id: self.room_id,
            item_id,
        });
        self.broadcast(MatchEvent::GameplayStarted {
            item_id,
            users: self.gameplay_users.clone(),
        });
    }

    /// Ends the running gameplay of `item_id`. Returns every participant
    /// with their score, if one was submitted.
    pub(crate) fn finish_gameplay(
        &mut self,
        item_id: ItemId,
        scores: &[(UserId, u64)],
    ) -> Result<Vec<(UserId, Option<u64>)>, RoomError> {
        if self.stage != Stage::Gameplay || !self.is_gameplay_running() {
            return Err(RoomError::invalid(format!(
                "no gameplay is running (stage {})",
                self.stage
            )));
        }
        if self.current_item != Some(item_id) {
            return Err(RoomError::invalid(format!(
                "item {item_id} is not the item being played"
            )));
        }

        for user in &mut self.users {
            user.playing = false;
        }
        let results = std::mem::take(&mut self.gameplay_users)
            .into_iter()
            .map(|user_id| {
                let score = scores.iter().find(|(id, _)| *id == user_id).map(|(_, s)| *s);
                (user_id, score)
            })
            .collect();
        Ok(results)
    }

    pub(crate) fn enter_results(&mut self) {
        self.change_stage(Stage::Results);
        self.start_countdown(self.config.results);
    }

    /// Ends the match. The close countdown then asks the hub to tear the
    /// room down.
    pub(crate) fn end_match(&mut self, placements: Vec<FinalPlacement>) {
        if self.stage == Stage::Ended {
            return;
        }
        self.gameplay_users.clear();
        for user in &mut self.users {
            user.playing = false;
        }
        self.change_stage(Stage::Ended);
        tracing::info!(room_id = %self.room_id, users = placements.len(), "match ended");
        self.broadcast(MatchEvent::MatchEnded {
            placements: placements.clone(),
        });
        if !placements.is_empty() {
            self.push(Outbound::RecordMatchResults {
                room_id: self.room_id,
                pool_id: self.pool_id,
                placements,
            });
        }
        self.start_countdown(self.config.close_delay);
    }

    /// Handles the elapsed timers whose stages behave the same in every
    /// mode. Returns `false` for stages the controller must handle.
    pub(crate) fn shared_countdown_elapsed(&mut self, stage: Stage) -> bool {
        match stage {
            Stage::FinishSelection => self.enter_gameplay_warmup(),
            Stage::GameplayWarmup => {
                self.warmup_elapsed = true;
                self.try_start_gameplay(false);
            }
            Stage::Gameplay => self.begin_gameplay(),
            Stage::Ended => {
                tracing::info!(room_id = %self.room_id, "close delay elapsed");
                self.push(Outbound::CloseRoom {
                    room_id: self.room_id,
                });
            }
            _ => return false,
        }
        true
    }
}
