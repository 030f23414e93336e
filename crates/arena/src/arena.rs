//! `Arena` builder and hub operations.
//!
//! This is the entry point for a match server. It ties together the
//! layers: session registry → room registry → matchmaking queues, and
//! hands every side effect to the collaborators without holding a lock.

use std::sync::{Arc, Weak};

use arena_matchmaking::{MatchmakingQueue, QueueError, QueueGroup, QueueUpdateBundle};
use arena_protocol::{PoolId, QueueEvent, RoomId, UserAction, UserId};
use arena_registry::{EntityGuard, RegistryError};
use arena_room::{MatchConfig, Room, RoomError, RoomRecord, RoomRegistry, RoomSnapshot, RoomUser};
use arena_tick::{TickConfig, TickScheduler};
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::dispatch::run_dispatcher;
use crate::session::{SessionRegistry, UserSession};
use crate::{
    ArenaConfig, ArenaError, ArenaMetrics, MetricsSnapshot, NewRoom, Notifier, Persistence,
    ScoreSource, UserEvent,
};

type QueueRef = Arc<Mutex<MatchmakingQueue>>;

/// Shared hub state. Background tasks hold a `Weak` to it, so dropping
/// every [`Arena`] handle stops them.
pub(crate) struct Inner<P, N, S> {
    pub(crate) config: ArenaConfig,
    pub(crate) match_config: Arc<MatchConfig>,
    pub(crate) rooms: Arc<RoomRegistry>,
    pub(crate) sessions: SessionRegistry,
    queues: DashMap<PoolId, QueueRef>,
    /// Completed groups whose room hasn't been created yet.
    pending: Mutex<Vec<QueueGroup>>,
    pub(crate) persistence: P,
    pub(crate) notifier: N,
    scores: S,
    pub(crate) metrics: Arc<ArenaMetrics>,
    outbox: arena_room::OutboundSender,
    shutdown: watch::Sender<bool>,
}

// ---------------------------------------------------------------------------
// ArenaBuilder
// ---------------------------------------------------------------------------

/// Builder for an [`Arena`].
///
/// # Example
///
/// ```rust,ignore
/// let arena = Arena::builder()
///     .queue_config(QueueConfig { room_size: 4, ..Default::default() })
///     .build(my_db, my_notifier, my_scores);
/// arena.spawn_matchmaking();
/// ```
pub struct ArenaBuilder {
    config: ArenaConfig,
    metrics: Option<Arc<ArenaMetrics>>,
}

impl ArenaBuilder {
    pub fn new() -> Self {
        Self {
            config: ArenaConfig::default(),
            metrics: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ArenaConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry_config(mut self, config: arena_registry::RegistryConfig) -> Self {
        self.config.registry = config;
        self
    }

    pub fn queue_config(mut self, config: arena_matchmaking::QueueConfig) -> Self {
        self.config.queue = config;
        self
    }

    pub fn match_config(mut self, config: MatchConfig) -> Self {
        self.config.matching = config;
        self
    }

    pub fn matchmaking_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.matchmaking_interval = interval;
        self
    }

    /// Shares an existing metrics collaborator instead of creating one.
    pub fn metrics(mut self, metrics: Arc<ArenaMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the hub and spawns its outbound dispatcher.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn build<P, N, S>(self, persistence: P, notifier: N, scores: S) -> Arena<P, N, S>
    where
        P: Persistence,
        N: Notifier,
        S: ScoreSource,
    {
        let config = self.config.validated();
        let (outbox, outbound) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            match_config: Arc::new(config.matching.clone()),
            rooms: Arc::new(RoomRegistry::new("room", config.registry.clone())),
            sessions: SessionRegistry::new("user", config.registry.clone()),
            queues: DashMap::new(),
            pending: Mutex::new(Vec::new()),
            persistence,
            notifier,
            scores,
            metrics: self.metrics.unwrap_or_default(),
            outbox,
            shutdown,
            config,
        });

        tokio::spawn(run_dispatcher(
            Arc::downgrade(&inner),
            outbound,
            shutdown_rx,
        ));
        tracing::info!(
            room_size = inner.config.queue.room_size,
            interval_ms = inner.config.matchmaking_interval.as_millis() as u64,
            "arena started"
        );

        Arena { inner }
    }
}

impl Default for ArenaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// The session-orchestration hub.
///
/// Every operation is safe to call concurrently from connection tasks.
/// Cloning is cheap and every clone drives the same hub.
pub struct Arena<P, N, S> {
    inner: Arc<Inner<P, N, S>>,
}

impl<P, N, S> Clone for Arena<P, N, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, N, S> Arena<P, N, S>
where
    P: Persistence,
    N: Notifier,
    S: ScoreSource,
{
    pub fn builder() -> ArenaBuilder {
        ArenaBuilder::new()
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn persistence(&self) -> &P {
        &self.inner.persistence
    }

    pub fn notifier(&self) -> &N {
        &self.inner.notifier
    }

    // ---- Rooms ----

    /// Puts a user into a room, creating the room from its persisted
    /// record if it isn't live yet.
    ///
    /// # Errors
    /// - [`RoomError::AlreadyInRoom`] if the user is in any room
    /// - [`QueueError::Capacity`] if the user is queued
    /// - [`RoomError::InvalidState`] if the match has ended or the user
    ///   isn't one of the room's required users
    pub async fn join_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomSnapshot, ArenaError> {
        self.inner.join_room(room_id, user_id).await
    }

    pub async fn leave_room(&self, room_id: RoomId, user_id: UserId) -> Result<(), ArenaError> {
        self.inner.leave_room(room_id, user_id).await
    }

    /// Routes an action to the room's controller. Rejected actions leave
    /// the room unchanged and come back as `RoomError::InvalidState`.
    pub async fn dispatch_user_action(
        &self,
        room_id: RoomId,
        user_id: UserId,
        action: UserAction,
    ) -> Result<(), ArenaError> {
        let inner = &self.inner;
        let mut guard = inner.rooms.acquire(room_id, false).await?;
        let room = live_room(&mut guard)?;
        room.handle_action(user_id, action)?;
        Ok(())
    }

    /// Fetches the scores for the room's current gameplay and hands them
    /// to its controller.
    pub async fn complete_gameplay(&self, room_id: RoomId) -> Result<(), ArenaError> {
        let inner = &self.inner;
        let item_id = {
            let mut guard = inner.rooms.acquire(room_id, false).await?;
            let room = live_room(&mut guard)?;
            room.current_item()
                .filter(|_| room.context().is_gameplay_running())
                .ok_or_else(|| RoomError::InvalidState("no gameplay in progress".into()))?
        };

        let scores = inner.scores.get_scores_for_item(item_id).await?;
        tracing::debug!(%room_id, %item_id, scores = scores.len(), "scores fetched");

        let mut guard = inner.rooms.acquire(room_id, false).await?;
        live_room(&mut guard)?.complete_gameplay(item_id, &scores)?;
        Ok(())
    }

    /// Operator affordance: fast-forwards the room's current stage.
    pub async fn admin_skip_stage(&self, room_id: RoomId) -> Result<(), ArenaError> {
        let mut guard = self.inner.rooms.acquire(room_id, false).await?;
        live_room(&mut guard)?.skip_stage()?;
        Ok(())
    }

    pub async fn room_snapshot(&self, room_id: RoomId) -> Result<RoomSnapshot, ArenaError> {
        let mut guard = self.inner.rooms.acquire(room_id, false).await?;
        Ok(live_room(&mut guard)?.snapshot())
    }

    /// Every live room as it was when its lock was last released. Never
    /// waits on a room, so a busy room shows its previous state.
    pub fn room_snapshots(&self) -> Vec<RoomSnapshot> {
        let mut rooms: Vec<RoomSnapshot> = self
            .inner
            .rooms
            .snapshot_all()
            .into_iter()
            .map(|(_, snapshot)| RoomSnapshot::clone(&snapshot))
            .collect();
        rooms.sort_by_key(|room| room.room_id);
        rooms
    }

    /// The user's current session, if they have one.
    pub async fn session(&self, user_id: UserId) -> Option<UserSession> {
        let guard = self.inner.sessions.acquire(user_id, false).await.ok()?;
        guard.item().cloned()
    }

    // ---- Matchmaking ----

    /// Adds a user to the queue of `pool_id`. Joining the same pool twice
    /// is a no-op.
    ///
    /// # Errors
    /// [`QueueError::Capacity`] if the user is in a room or queued in a
    /// different pool.
    pub async fn queue_join(&self, user_id: UserId, pool_id: PoolId) -> Result<(), ArenaError> {
        self.inner.queue_join(user_id, pool_id).await
    }

    pub async fn queue_leave(&self, user_id: UserId) -> Result<(), ArenaError> {
        let inner = &self.inner;
        inner
            .with_user_queue(user_id, |queue| queue.remove(user_id))
            .await?;
        inner.finalize_pending().await;
        Ok(())
    }

    pub async fn queue_accept_invite(&self, user_id: UserId) -> Result<(), ArenaError> {
        let inner = &self.inner;
        inner
            .with_user_queue(user_id, |queue| queue.mark_invitation_accepted(user_id))
            .await?;
        inner.finalize_pending().await;
        Ok(())
    }

    pub async fn queue_decline_invite(&self, user_id: UserId) -> Result<(), ArenaError> {
        let inner = &self.inner;
        inner
            .with_user_queue(user_id, |queue| queue.mark_invitation_declined(user_id))
            .await?;
        inner.finalize_pending().await;
        Ok(())
    }

    /// Runs one matchmaking tick over every pool, then retries any group
    /// whose room couldn't be created yet.
    pub async fn matchmaking_tick(&self) {
        self.inner.matchmaking_tick().await;
    }

    /// Spawns the background loop that calls
    /// [`matchmaking_tick`](Self::matchmaking_tick) every
    /// `matchmaking_interval`. The loop ends on [`shutdown`](Self::shutdown)
    /// or when the last `Arena` handle is dropped.
    pub fn spawn_matchmaking(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let mut shutdown = self.inner.shutdown.subscribe();
        let interval = self.inner.config.matchmaking_interval;

        tokio::spawn(async move {
            let mut scheduler = TickScheduler::new(TickConfig::every(interval));
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = scheduler.wait_for_tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.matchmaking_tick().await;
                        scheduler.record_tick_end();
                    }
                }
            }
            tracing::debug!("matchmaking loop stopped");
        })
    }

    /// Stops the background tasks and closes every live room.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.shutdown.send_replace(true);
        for room_id in inner.rooms.ids() {
            inner.close_room(room_id).await;
        }
        tracing::info!("arena shut down");
    }
}

// ---------------------------------------------------------------------------
// Inner: operations shared with the background tasks
// ---------------------------------------------------------------------------

impl<P, N, S> Inner<P, N, S>
where
    P: Persistence,
    N: Notifier,
    S: ScoreSource,
{
    async fn join_room(&self, room_id: RoomId, user_id: UserId) -> Result<RoomSnapshot, ArenaError> {
        // Collaborator calls happen before any lock is taken.
        let (pool_id, mut record) = self.room_pool(room_id).await?;
        let stats = self
            .persistence
            .load_or_create_user_stats(user_id, pool_id)
            .await?;

        let mut session = self.sessions.acquire(user_id, true).await?;
        let session_created = session.is_empty();
        if session_created {
            session.set_item(UserSession::new(user_id));
            self.metrics.user_connected();
        }

        let result = self
            .enter_room(&mut session, room_id, &mut record, RoomUser::new(user_id, stats.rating))
            .await;
        if result.is_err() {
            self.release_if_idle(session);
        }
        result
    }

    /// Session-locked half of `join_room`.
    async fn enter_room(
        &self,
        session: &mut EntityGuard<UserId, UserSession>,
        room_id: RoomId,
        record: &mut Option<RoomRecord>,
        user: RoomUser,
    ) -> Result<RoomSnapshot, ArenaError> {
        let user_id = user.user_id;
        let state = session.item().cloned().unwrap_or_else(|| UserSession::new(user_id));
        if let Some(current) = state.room_id {
            return Err(RoomError::AlreadyInRoom(user_id, current).into());
        }
        if let Some(pool_id) = state.queue {
            return Err(QueueError::Capacity {
                user_id,
                reason: format!("queued in pool {pool_id}"),
            }
            .into());
        }

        let mut guard = self.rooms.acquire(room_id, true).await?;
        let room_created = guard.is_empty();
        if room_created {
            let Some(record) = record.take() else {
                // Destroyed and recreated between the record check and now.
                guard.destroy();
                return Err(RegistryError::Destroyed {
                    kind: self.rooms.kind(),
                    id: room_id.to_string(),
                }
                .into());
            };
            guard.set_item(Room::new(
                record,
                Arc::clone(&self.match_config),
                Arc::downgrade(&self.rooms),
                self.outbox.clone(),
            ));
            self.metrics.room_opened();
        }

        let room = live_room(&mut guard)?;
        if let Err(e) = room.join(user) {
            if room_created && room.is_empty() {
                guard.destroy();
                self.metrics.room_closed();
            }
            return Err(e.into());
        }
        let snapshot = room.snapshot();
        drop(guard);

        if let Some(state) = session.item_mut() {
            state.room_id = Some(room_id);
        }
        Ok(snapshot)
    }

    /// The room's pool, plus its record when the room isn't live yet.
    async fn room_pool(&self, room_id: RoomId) -> Result<(PoolId, Option<RoomRecord>), ArenaError> {
        if self.rooms.contains(&room_id) {
            match self.rooms.acquire(room_id, false).await {
                Ok(guard) => {
                    if let Some(room) = guard.item() {
                        return Ok((room.pool_id(), None));
                    }
                }
                Err(RegistryError::NotFound { .. } | RegistryError::Destroyed { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        let record = self.persistence.load_room(room_id).await?;
        Ok((record.pool_id, Some(record)))
    }

    async fn leave_room(&self, room_id: RoomId, user_id: UserId) -> Result<(), ArenaError> {
        let not_in_room = || ArenaError::from(RoomError::NotInRoom(user_id, room_id));

        let mut session = match self.sessions.acquire(user_id, false).await {
            Ok(session) => session,
            Err(RegistryError::NotFound { .. }) => return Err(not_in_room()),
            Err(e) => return Err(e.into()),
        };
        if session.item().and_then(|s| s.room_id) != Some(room_id) {
            return Err(not_in_room());
        }

        let mut guard = self.rooms.acquire(room_id, false).await?;
        let room = live_room(&mut guard)?;
        room.leave(user_id)?;
        if room.is_empty() {
            room.close();
            guard.destroy();
            self.metrics.room_closed();
            tracing::info!(%room_id, "room emptied and destroyed");
        } else {
            drop(guard);
        }

        if let Some(state) = session.item_mut() {
            state.room_id = None;
        }
        self.release_if_idle(session);
        Ok(())
    }

    /// Tears a room down and frees its users. Used by the close countdown
    /// and by shutdown.
    pub(crate) async fn close_room(&self, room_id: RoomId) {
        let users = match self.rooms.acquire(room_id, false).await {
            Ok(mut guard) => {
                let users = guard.item_mut().map(Room::close).unwrap_or_default();
                if guard.destroy().is_some() {
                    self.metrics.room_closed();
                }
                users
            }
            Err(e) => {
                tracing::debug!(%room_id, error = %e, "room already gone");
                return;
            }
        };

        for user_id in users {
            let Ok(mut session) = self.sessions.acquire(user_id, false).await else {
                continue;
            };
            if let Some(state) = session.item_mut() {
                if state.room_id == Some(room_id) {
                    state.room_id = None;
                }
            }
            self.release_if_idle(session);
        }
        tracing::info!(%room_id, "room destroyed");
    }

    /// Destroys the session if it no longer holds the user anywhere.
    fn release_if_idle(&self, session: EntityGuard<UserId, UserSession>) {
        if session.item().is_none_or(UserSession::is_idle) {
            let user_id = session.id();
            if session.destroy().is_some() {
                self.metrics.user_disconnected();
            }
            tracing::debug!(%user_id, "session released");
        }
    }

    // ---- Matchmaking ----

    fn queue(&self, pool_id: PoolId) -> QueueRef {
        Arc::clone(
            self.queues
                .entry(pool_id)
                .or_insert_with(|| {
                    tracing::info!(%pool_id, "matchmaking queue created");
                    Arc::new(Mutex::new(MatchmakingQueue::new(
                        pool_id,
                        self.config.queue.clone(),
                    )))
                })
                .value(),
        )
    }

    async fn queue_join(&self, user_id: UserId, pool_id: PoolId) -> Result<(), ArenaError> {
        let stats = self
            .persistence
            .load_or_create_user_stats(user_id, pool_id)
            .await?;

        let mut session = self.sessions.acquire(user_id, true).await?;
        if session.is_empty() {
            session.set_item(UserSession::new(user_id));
            self.metrics.user_connected();
        }
        let state = session.item().cloned().unwrap_or_else(|| UserSession::new(user_id));

        let conflict = match (state.room_id, state.queue) {
            (Some(room_id), _) => Some(format!("in room {room_id}")),
            (None, Some(queued)) if queued != pool_id => Some(format!("queued in pool {queued}")),
            (None, Some(_)) => return Ok(()),
            (None, None) => None,
        };
        if let Some(reason) = conflict {
            self.release_if_idle(session);
            return Err(QueueError::Capacity { user_id, reason }.into());
        }

        let bundle = {
            let queue = self.queue(pool_id);
            let mut queue = queue.lock().await;
            let before = queue.len();
            let bundle = queue.add(user_id, stats.rating);
            self.metrics.queue_resized(before, queue.len());
            bundle
        };
        if let Some(state) = session.item_mut() {
            state.queue = Some(pool_id);
        }
        drop(session);

        tracing::info!(%user_id, %pool_id, rating = stats.rating.mu, "user queued");
        self.process_bundle(pool_id, bundle).await;
        Ok(())
    }

    /// Runs `op` on the queue the user is in. The session lock is released
    /// before the queue is touched.
    async fn with_user_queue(
        &self,
        user_id: UserId,
        op: impl FnOnce(&mut MatchmakingQueue) -> Result<QueueUpdateBundle, QueueError>,
    ) -> Result<(), ArenaError> {
        let pool_id = match self.sessions.acquire(user_id, false).await {
            Ok(session) => session.item().and_then(|s| s.queue),
            Err(RegistryError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        }
        .ok_or(QueueError::NotQueued(user_id))?;

        let bundle = {
            let queue = self.queue(pool_id);
            let mut queue = queue.lock().await;
            let before = queue.len();
            let bundle = op(&mut *queue)?;
            self.metrics.queue_resized(before, queue.len());
            bundle
        };
        self.process_bundle(pool_id, bundle).await;
        Ok(())
    }

    async fn matchmaking_tick(&self) {
        let queues: Vec<(PoolId, QueueRef)> = self
            .queues
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (pool_id, queue) in queues {
            let bundle = {
                let mut queue = queue.lock().await;
                let before = queue.len();
                let bundle = queue.update();
                self.metrics.queue_resized(before, queue.len());
                bundle
            };
            self.process_bundle(pool_id, bundle).await;
        }
        self.finalize_pending().await;
    }

    /// Applies a queue outcome to sessions and tells the users. Called
    /// with no lock held.
    async fn process_bundle(&self, pool_id: PoolId, bundle: QueueUpdateBundle) {
        if bundle.is_empty() {
            return;
        }
        let QueueUpdateBundle {
            added,
            removed,
            formed,
            completed,
        } = bundle;

        for user_id in removed {
            if let Ok(mut session) = self.sessions.acquire(user_id, false).await {
                if let Some(state) = session.item_mut() {
                    if state.queue == Some(pool_id) {
                        state.queue = None;
                    }
                }
                self.release_if_idle(session);
            }
            self.send_queue_event(user_id, QueueEvent::Removed { pool_id }).await;
        }

        for user_id in added {
            self.send_queue_event(user_id, QueueEvent::Searching { pool_id }).await;
        }

        for group in &formed {
            let users = group.user_ids();
            tracing::info!(%pool_id, group_id = %group.id, users = users.len(), "group invited");
            for user_id in &users {
                let event = QueueEvent::Invited {
                    group_id: group.id,
                    users: users.clone(),
                };
                self.send_queue_event(*user_id, event).await;
            }
        }

        if !completed.is_empty() {
            for group in &completed {
                tracing::info!(%pool_id, group_id = %group.id, "group completed");
                self.metrics.group_completed();
            }
            self.pending.lock().await.extend(completed);
        }
    }

    /// Creates rooms for completed groups. A group whose room can't be
    /// created stays pending for the next tick.
    async fn finalize_pending(&self) {
        let groups = std::mem::take(&mut *self.pending.lock().await);
        if groups.is_empty() {
            return;
        }

        let mut retry = Vec::new();
        for group in groups {
            let request = NewRoom {
                pool_id: group.pool_id,
                users: group.user_ids(),
            };
            match self.persistence.create_room(request).await {
                Ok(room_id) => {
                    tracing::info!(%room_id, group_id = %group.id, "room created for group");
                    for user_id in group.user_ids() {
                        if let Ok(mut session) = self.sessions.acquire(user_id, false).await {
                            if let Some(state) = session.item_mut() {
                                if state.queue == Some(group.pool_id) {
                                    state.queue = None;
                                }
                            }
                            self.release_if_idle(session);
                        }
                        self.send_queue_event(user_id, QueueEvent::RoomReady { room_id })
                            .await;
                    }
                }
                Err(e) => {
                    tracing::warn!(group_id = %group.id, error = %e, "room creation failed, will retry");
                    retry.push(group);
                }
            }
        }

        if !retry.is_empty() {
            self.pending.lock().await.extend(retry);
        }
    }

    async fn send_queue_event(&self, user_id: UserId, event: QueueEvent) {
        if let Err(e) = self
            .notifier
            .send_to_user(user_id, UserEvent::Queue(event))
            .await
        {
            tracing::warn!(%user_id, error = %e, "queue notification failed");
        }
    }
}

/// The room behind a guard. An empty slot is only visible while another
/// caller is halfway through creating it, so it counts as missing.
fn live_room(guard: &mut EntityGuard<RoomId, Room>) -> Result<&mut Room, ArenaError> {
    let room_id = guard.id();
    guard.item_mut().ok_or_else(|| {
        RegistryError::NotFound {
            kind: "room",
            id: room_id.to_string(),
        }
        .into()
    })
}

/// Lets background tasks reach the hub without keeping it alive.
pub(crate) type WeakInner<P, N, S> = Weak<Inner<P, N, S>>;
