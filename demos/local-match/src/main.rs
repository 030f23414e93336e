//! Runs one matchmade card battle against in-memory collaborators.
//!
//! Two users queue in the same pool, accept their invitation, join the
//! room and play until someone runs out of life. Every event the hub
//! emits is logged as JSON.
//!
//! ```text
//! RUST_LOG=debug cargo run -p local-match
//! ```

use std::collections::HashMap;
use std::time::Duration;

use arena::prelude::*;
use arena::UserStats;
use rand::Rng;
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InMemoryStore {
    rooms: Mutex<HashMap<RoomId, RoomRecord>>,
    stats: Mutex<HashMap<(UserId, PoolId), UserStats>>,
    next_room: Mutex<i64>,
}

impl Persistence for InMemoryStore {
    async fn load_room(&self, room_id: RoomId) -> Result<RoomRecord, ServiceError> {
        self.rooms
            .lock()
            .await
            .get(&room_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("room {room_id}")))
    }

    async fn mark_room_active(&self, room_id: RoomId) -> Result<(), ServiceError> {
        tracing::info!(%room_id, "room marked active");
        Ok(())
    }

    async fn record_played_item(&self, room_id: RoomId, item_id: ItemId) -> Result<(), ServiceError> {
        tracing::info!(%room_id, %item_id, "item played");
        Ok(())
    }

    async fn load_or_create_user_stats(
        &self,
        user_id: UserId,
        pool_id: PoolId,
    ) -> Result<UserStats, ServiceError> {
        Ok(self
            .stats
            .lock()
            .await
            .entry((user_id, pool_id))
            .or_insert_with(|| UserStats::new(user_id, pool_id))
            .clone())
    }

    async fn save_user_stats(&self, stats: UserStats) -> Result<(), ServiceError> {
        tracing::info!(
            user_id = %stats.user_id,
            mu = stats.rating.mu,
            sigma = stats.rating.sigma,
            matches = stats.matches_played,
            "stats saved"
        );
        self.stats
            .lock()
            .await
            .insert((stats.user_id, stats.pool_id), stats);
        Ok(())
    }

    async fn create_room(&self, request: NewRoom) -> Result<RoomId, ServiceError> {
        let mut next = self.next_room.lock().await;
        *next += 1;
        let room_id = RoomId(*next);
        let playlist = (1..=12)
            .map(|id| PlaylistItem {
                id: ItemId(id),
                difficulty: 1200.0 + 50.0 * id as f64,
            })
            .collect();
        self.rooms.lock().await.insert(
            room_id,
            RoomRecord {
                id: room_id,
                mode: MatchMode::CardBattle,
                pool_id: request.pool_id,
                playlist,
                required_users: request.users,
            },
        );
        Ok(room_id)
    }
}

/// Logs every delivery and remembers where each user was sent.
#[derive(Default)]
struct LogNotifier {
    ready: Mutex<HashMap<UserId, RoomId>>,
}

impl Notifier for LogNotifier {
    async fn broadcast_to_room(&self, room_id: RoomId, event: MatchEvent) -> Result<(), ServiceError> {
        let json = serde_json::to_string(&event).unwrap_or_default();
        tracing::info!(%room_id, %json, "broadcast");
        Ok(())
    }

    async fn send_to_user(&self, user_id: UserId, event: UserEvent) -> Result<(), ServiceError> {
        if let UserEvent::Queue(QueueEvent::RoomReady { room_id }) = &event {
            self.ready.lock().await.insert(user_id, *room_id);
        }
        let json = serde_json::to_string(&event).unwrap_or_default();
        tracing::info!(%user_id, %json, "send");
        Ok(())
    }
}

struct RandomScores;

impl ScoreSource for RandomScores {
    async fn get_scores_for_item(&self, _item_id: ItemId) -> Result<Vec<(UserId, u64)>, ServiceError> {
        let mut rng = rand::rng();
        Ok(USERS
            .iter()
            .map(|user| (*user, rng.random_range(500_000..1_000_000)))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

const POOL: PoolId = PoolId(1);
const USERS: [UserId; 2] = [UserId(1), UserId(2)];

fn config() -> ArenaConfig {
    let ms = Duration::from_millis;
    ArenaConfig {
        matchmaking_interval: ms(200),
        matching: MatchConfig {
            round_warmup: ms(200),
            card_discard: ms(500),
            card_play: ms(300),
            finish_selection: ms(200),
            gameplay_warmup: ms(200),
            results: ms(300),
            close_delay: ms(500),
            ..MatchConfig::default()
        },
        ..ArenaConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), ArenaError> {
    arena::init_tracing();

    let arena = Arena::<InMemoryStore, LogNotifier, RandomScores>::builder()
        .config(config())
        .build(InMemoryStore::default(), LogNotifier::default(), RandomScores);
    let matchmaking = arena.spawn_matchmaking();

    for user in USERS {
        arena.queue_join(user, POOL).await?;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    for user in USERS {
        arena.queue_accept_invite(user).await?;
    }

    let Some(room_id) = arena.notifier().ready.lock().await.get(&USERS[0]).copied() else {
        tracing::error!("no room was created");
        return Ok(());
    };
    for user in USERS {
        arena.join_room(room_id, user).await?;
    }

    loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = arena.room_snapshot(room_id).await?;
        match snapshot.stage {
            Stage::CardDiscard => {
                for user in USERS {
                    let keep = UserAction::DiscardCards { card_ids: Vec::new() };
                    reject_ok(arena.dispatch_user_action(room_id, user, keep).await)?;
                }
            }
            Stage::GameplayWarmup => {
                for user in USERS {
                    let available = UserAction::SetAvailability { available: true };
                    reject_ok(arena.dispatch_user_action(room_id, user, available).await)?;
                    let ready = UserAction::SetReady { ready: true };
                    reject_ok(arena.dispatch_user_action(room_id, user, ready).await)?;
                }
            }
            Stage::Gameplay => reject_ok(arena.complete_gameplay(room_id).await)?,
            Stage::Ended => break,
            _ => {}
        }
    }

    for standing in arena.room_snapshot(room_id).await?.standings {
        tracing::info!(
            user_id = %standing.user_id,
            placement = standing.placement,
            life = standing.life.unwrap_or_default(),
            "final standing"
        );
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!(metrics = ?arena.metrics(), "match over");
    arena.shutdown().await;
    let _ = matchmaking.await;
    Ok(())
}

/// Swallows routine rejections (e.g. acting twice in one stage); passes
/// infrastructure failures on.
fn reject_ok(result: Result<(), ArenaError>) -> Result<(), ArenaError> {
    match result {
        Err(e) if e.is_rejection() => {
            tracing::debug!(error = %e, "rejected");
            Ok(())
        }
        other => other,
    }
}
