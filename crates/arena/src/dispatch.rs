//! Outbound dispatcher.
//!
//! Rooms queue their side effects while locked. The dispatcher task routes
//! each one to its room's lane, a task that performs that room's effects in
//! order once the lock is gone, so a stuck collaborator call only holds up
//! its own room. A failed call is logged and skipped.

use std::collections::HashMap;

use arena_matchmaking::elo_update;
use arena_protocol::{FinalPlacement, MatchEvent, PoolId, Recipient, RoomId};
use arena_room::Outbound;
use tokio::sync::{mpsc, watch};

use crate::arena::{Inner, WeakInner};
use crate::{Notifier, Persistence, ScoreSource, ServiceError, UserEvent};

type Lane = mpsc::UnboundedSender<Outbound>;

/// Routed effects between sweeps of retired lanes, at minimum.
const MIN_SWEEP: usize = 64;

/// Runs until shutdown, until every sender is gone, or until the hub
/// itself is dropped. Never awaits a collaborator.
pub(crate) async fn run_dispatcher<P, N, S>(
    inner: WeakInner<P, N, S>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mut shutdown: watch::Receiver<bool>,
) where
    P: Persistence,
    N: Notifier,
    S: ScoreSource,
{
    tracing::debug!("outbound dispatcher started");
    let mut lanes: HashMap<RoomId, Lane> = HashMap::new();
    let mut sweep_at = MIN_SWEEP;
    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = outbound.recv() => next,
        };
        let Some(effect) = next else { break };
        if inner.strong_count() == 0 {
            break;
        }

        let room_id = effect.room_id();
        let unsent = match lanes.get(&room_id) {
            Some(lane) => lane.send(effect).err().map(|e| e.0),
            None => Some(effect),
        };
        if let Some(effect) = unsent {
            let lane = spawn_lane(inner.clone(), room_id, shutdown.clone());
            if lane.send(effect).is_ok() {
                lanes.insert(room_id, lane);
            }
        }

        if lanes.len() >= sweep_at {
            lanes.retain(|_, lane| !lane.is_closed());
            sweep_at = (lanes.len() * 2).max(MIN_SWEEP);
        }
    }
    tracing::debug!("outbound dispatcher stopped");
}

/// Spawns the task that performs one room's effects in order.
///
/// The lane retires once it is idle and its room has left the registry.
/// It stops accepting effects first, so nothing routed to it is lost.
fn spawn_lane<P, N, S>(
    inner: WeakInner<P, N, S>,
    room_id: RoomId,
    mut shutdown: watch::Receiver<bool>,
) -> Lane
where
    P: Persistence,
    N: Notifier,
    S: ScoreSource,
{
    let (lane, mut effects) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => return,
                next = effects.recv() => next,
            };
            let Some(effect) = next else { return };
            let Some(hub) = inner.upgrade() else { return };
            hub.perform(effect).await;
            if effects.is_empty() && !hub.rooms.contains(&room_id) {
                break;
            }
        }

        effects.close();
        while let Ok(effect) = effects.try_recv() {
            let Some(hub) = inner.upgrade() else { return };
            hub.perform(effect).await;
        }
        tracing::trace!(%room_id, "room lane retired");
    });
    lane
}

impl<P, N, S> Inner<P, N, S>
where
    P: Persistence,
    N: Notifier,
    S: ScoreSource,
{
    async fn perform(&self, effect: Outbound) {
        match effect {
            Outbound::Event {
                room_id,
                recipient,
                event,
            } => self.deliver(room_id, recipient, event).await,

            Outbound::MarkRoomActive { room_id } => {
                if let Err(e) = self.persistence.mark_room_active(room_id).await {
                    tracing::warn!(%room_id, error = %e, "failed to mark room active");
                }
            }

            Outbound::RecordPlayedItem { room_id, item_id } => {
                if let Err(e) = self.persistence.record_played_item(room_id, item_id).await {
                    tracing::warn!(%room_id, %item_id, error = %e, "failed to record played item");
                }
            }

            Outbound::RecordMatchResults {
                room_id,
                pool_id,
                placements,
            } => {
                if let Err(e) = self.record_results(pool_id, &placements).await {
                    tracing::warn!(%room_id, %pool_id, error = %e, "failed to record match results");
                }
            }

            Outbound::CloseRoom { room_id } => self.close_room(room_id).await,
        }
    }

    async fn deliver(&self, room_id: RoomId, recipient: Recipient, event: MatchEvent) {
        let result = match recipient {
            Recipient::All => self.notifier.broadcast_to_room(room_id, event).await,
            Recipient::User(user_id) => {
                self.notifier
                    .send_to_user(user_id, UserEvent::Match(event))
                    .await
            }
        };
        if let Err(e) = result {
            tracing::warn!(%room_id, ?recipient, error = %e, "event delivery failed");
        }
    }

    /// Applies the multi-player Elo update to every placed user's stats
    /// in `pool_id`.
    async fn record_results(
        &self,
        pool_id: PoolId,
        placements: &[FinalPlacement],
    ) -> Result<(), ServiceError> {
        let mut stats = Vec::with_capacity(placements.len());
        for placement in placements {
            stats.push(
                self.persistence
                    .load_or_create_user_stats(placement.user_id, pool_id)
                    .await?,
            );
        }

        let entries: Vec<_> = stats
            .iter()
            .zip(placements)
            .map(|(s, p)| (s.rating, p.placement))
            .collect();
        let ratings = elo_update(&entries);

        for (mut updated, rating) in stats.into_iter().zip(ratings) {
            tracing::debug!(
                user_id = %updated.user_id,
                %pool_id,
                before = updated.rating.mu,
                after = rating.mu,
                "rating updated"
            );
            updated.rating = rating;
            updated.matches_played += 1;
            self.persistence.save_user_stats(updated).await?;
        }
        Ok(())
    }
}
