//! A room: one match session, owned by its registry slot.

use std::sync::{Arc, Weak};

use arena_protocol::{
    CountdownView, ItemId, MatchEvent, MatchMode, PlaylistItem, PoolId, Rating, RoomId, Stage,
    Standing, UserAction, UserId,
};
use arena_registry::{Entity, EntityRegistry};
use arena_tick::{CountdownHost, CountdownInfo, Countdowns};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::context::countdown_view;
use crate::{MatchConfig, MatchContext, Outbound, OutboundSender, RoomError, StageController};

/// The registry rooms live in.
pub type RoomRegistry = EntityRegistry<RoomId, Room>;

/// What persistence knows about a room before anyone joins it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: RoomId,
    pub mode: MatchMode,
    pub pool_id: PoolId,
    pub playlist: Vec<PlaylistItem>,
    /// Users the match waits for before starting. Empty means the match
    /// starts with whoever joins first.
    pub required_users: Vec<UserId>,
}

/// A user's presence in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUser {
    pub user_id: UserId,
    pub rating: Rating,
    pub ready: bool,
    /// The user has the current item available locally.
    pub available: bool,
    pub playing: bool,
}

impl RoomUser {
    pub fn new(user_id: UserId, rating: Rating) -> Self {
        Self {
            user_id,
            rating,
            ready: false,
            available: false,
            playing: false,
        }
    }
}

/// Point-in-time view of a room, returned to a joining user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub mode: MatchMode,
    pub pool_id: PoolId,
    pub stage: Stage,
    pub round: u32,
    pub users: Vec<RoomUser>,
    pub countdown: Option<CountdownView>,
    pub current_item: Option<ItemId>,
    pub standings: Vec<Standing>,
}

/// A live match session.
///
/// Every method assumes the caller holds the room's registry lock. Side
/// effects go out through the room's [`OutboundSender`].
pub struct Room {
    ctx: MatchContext,
    controller: StageController,
}

impl Room {
    /// Creates the room and initialises its controller. The room then
    /// waits for its users in `WaitForJoin`.
    pub fn new(
        record: RoomRecord,
        config: Arc<MatchConfig>,
        registry: Weak<RoomRegistry>,
        outbox: OutboundSender,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(record.id.0 as u64)),
            None => StdRng::from_os_rng(),
        };
        let room_id = record.id;
        let ctx = MatchContext::new(
            room_id,
            record.mode,
            record.pool_id,
            record.playlist,
            record.required_users,
            config,
            Countdowns::new(room_id, registry),
            rng,
            outbox,
        );

        let mut room = Self {
            ctx,
            controller: StageController::new(record.mode),
        };
        room.ctx.push(Outbound::MarkRoomActive { room_id });
        room.controller.initialise(&mut room.ctx);
        tracing::info!(
            %room_id,
            mode = %record.mode,
            items = room.ctx.playlist.len(),
            required = room.ctx.required_users.len(),
            "room created"
        );
        room
    }

    // ---- Queries ----

    pub fn id(&self) -> RoomId {
        self.ctx.room_id()
    }

    pub fn mode(&self) -> MatchMode {
        self.ctx.mode()
    }

    pub fn pool_id(&self) -> PoolId {
        self.ctx.pool_id()
    }

    pub fn stage(&self) -> Stage {
        self.ctx.stage()
    }

    pub fn round(&self) -> u32 {
        self.ctx.round()
    }

    pub fn users(&self) -> &[RoomUser] {
        self.ctx.users()
    }

    pub fn user(&self, user_id: UserId) -> Option<&RoomUser> {
        self.ctx.user(user_id)
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.ctx.contains_user(user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.ctx.users().is_empty()
    }

    pub fn current_item(&self) -> Option<ItemId> {
        self.ctx.current_item()
    }

    pub fn countdown(&self) -> Option<CountdownView> {
        self.ctx.countdown()
    }

    pub fn context(&self) -> &MatchContext {
        &self.ctx
    }

    pub fn controller(&self) -> &StageController {
        &self.controller
    }

    pub fn standings(&self) -> Vec<Standing> {
        self.controller.standings(&self.ctx)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id(),
            mode: self.mode(),
            pool_id: self.pool_id(),
            stage: self.stage(),
            round: self.round(),
            users: self.ctx.users().to_vec(),
            countdown: self.countdown(),
            current_item: self.current_item(),
            standings: self.standings(),
        }
    }

    // ---- Entry points ----

    /// Adds a user. Fails if they are already here, the match has ended,
    /// or the room waits for a fixed set of users that doesn't include
    /// them.
    pub fn join(&mut self, user: RoomUser) -> Result<(), RoomError> {
        let room_id = self.id();
        let user_id = user.user_id;
        if self.contains_user(user_id) {
            return Err(RoomError::AlreadyInRoom(user_id, room_id));
        }
        if self.stage().is_terminal() {
            return Err(RoomError::invalid("the match has ended"));
        }
        let required = self.ctx.required_users();
        if !required.is_empty() && !required.contains(&user_id) {
            return Err(RoomError::invalid(format!(
                "user {user_id} is not part of this match"
            )));
        }

        self.ctx.users.push(user);
        tracing::info!(%room_id, %user_id, users = self.ctx.users.len(), "user joined");
        self.ctx.broadcast(MatchEvent::UserJoined { user_id });
        self.controller.handle_user_joined(&mut self.ctx, user_id);
        Ok(())
    }

    /// Removes a user and returns their room state.
    pub fn leave(&mut self, user_id: UserId) -> Result<RoomUser, RoomError> {
        let room_id = self.id();
        let pos = self
            .ctx
            .users
            .iter()
            .position(|u| u.user_id == user_id)
            .ok_or(RoomError::NotInRoom(user_id, room_id))?;
        let user = self.ctx.users.remove(pos);

        tracing::info!(%room_id, %user_id, users = self.ctx.users.len(), "user left");
        self.ctx.broadcast(MatchEvent::UserLeft { user_id });
        self.controller.handle_user_left(&mut self.ctx, user_id);
        Ok(user)
    }

    /// Routes a user's action to the controller. Rejected actions leave
    /// the room unchanged.
    pub fn handle_action(&mut self, user_id: UserId, action: UserAction) -> Result<(), RoomError> {
        let room_id = self.id();
        if !self.contains_user(user_id) {
            return Err(RoomError::NotInRoom(user_id, room_id));
        }
        let result = self
            .controller
            .handle_user_action(&mut self.ctx, user_id, action);
        if let Err(e) = &result {
            tracing::debug!(%room_id, %user_id, error = %e, "action rejected");
        }
        result
    }

    /// Delivers the scores of a finished gameplay.
    pub fn complete_gameplay(
        &mut self,
        item_id: ItemId,
        scores: &[(UserId, u64)],
    ) -> Result<(), RoomError> {
        self.controller
            .handle_gameplay_completed(&mut self.ctx, item_id, scores)
    }

    /// Operator affordance: fast-forwards the current stage.
    pub fn skip_stage(&mut self) -> Result<(), RoomError> {
        let room_id = self.id();
        tracing::info!(%room_id, stage = %self.stage(), "skip requested");
        self.controller.skip_to_next_stage(&mut self.ctx)
    }

    /// Stops all countdowns and removes every user. Returns the removed
    /// users.
    pub fn close(&mut self) -> Vec<UserId> {
        self.ctx.countdowns.stop_all();
        let users: Vec<UserId> = self.ctx.users.drain(..).map(|u| u.user_id).collect();
        tracing::info!(room_id = %self.id(), users = users.len(), "room closed");
        users
    }

    pub(crate) fn countdown_elapsed(&mut self, stage: Stage) {
        let Self { ctx, controller } = self;
        controller.on_countdown_elapsed(ctx, stage);
    }
}

impl Entity for Room {
    type View = RoomSnapshot;

    fn view(&self) -> RoomSnapshot {
        self.snapshot()
    }
}

impl CountdownHost for Room {
    type Id = RoomId;
    type Tag = Stage;

    fn countdowns(&mut self) -> &mut Countdowns<Self> {
        &mut self.ctx.countdowns
    }

    fn countdown_changed(&mut self, countdown: Option<CountdownInfo<Stage>>) {
        self.ctx.broadcast(MatchEvent::CountdownChanged {
            countdown: countdown.as_ref().map(countdown_view),
        });
    }
}
