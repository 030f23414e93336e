//! Shared harness: one room in a real registry, with its outbound queue
//! captured. Time is paused in every test, so sleeping lets countdown
//! tasks run.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use arena_protocol::{
    ItemId, MatchEvent, MatchMode, PlaylistItem, PoolId, Rating, Recipient, RoomId, Stage,
    UserAction, UserId,
};
use arena_registry::RegistryConfig;
use arena_room::{MatchConfig, Outbound, Room, RoomError, RoomRecord, RoomRegistry, RoomUser};
use tokio::sync::mpsc;

pub const ROOM: RoomId = RoomId(1);

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

pub fn ms(m: u64) -> Duration {
    Duration::from_millis(m)
}

pub fn uid(id: i64) -> UserId {
    UserId(id)
}

pub fn config() -> MatchConfig {
    MatchConfig {
        round_warmup: secs(1),
        beatmap_select: secs(10),
        card_discard: secs(10),
        card_play: secs(10),
        finish_selection: secs(1),
        gameplay_warmup: secs(1),
        results: secs(1),
        close_delay: secs(5),
        rounds: 2,
        points: vec![8, 7, 6, 5, 4, 3, 2, 1],
        hand_size: 3,
        starting_life: 1_000_000,
        reference_difficulty: 1500.0,
        selection_spread: 200.0,
        seed: Some(42),
    }
}

pub fn playlist(ids: &[i64], difficulty: f64) -> Vec<PlaylistItem> {
    ids.iter()
        .map(|id| PlaylistItem {
            id: ItemId(*id),
            difficulty,
        })
        .collect()
}

pub struct Harness {
    pub registry: Arc<RoomRegistry>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl Harness {
    pub async fn new(
        mode: MatchMode,
        required: &[i64],
        playlist: Vec<PlaylistItem>,
        config: MatchConfig,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new("room", RegistryConfig::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        let record = RoomRecord {
            id: ROOM,
            mode,
            pool_id: PoolId(1),
            playlist,
            required_users: required.iter().map(|id| UserId(*id)).collect(),
        };

        let mut guard = registry.acquire(ROOM, true).await.unwrap();
        guard.set_item(Room::new(
            record,
            Arc::new(config),
            Arc::downgrade(&registry),
            tx,
        ));
        drop(guard);

        Self {
            registry,
            outbound: rx,
        }
    }

    pub async fn with_room<R>(&self, f: impl FnOnce(&mut Room) -> R) -> R {
        let mut guard = self.registry.acquire(ROOM, false).await.unwrap();
        f(guard.item_mut().unwrap())
    }

    pub async fn stage(&self) -> Stage {
        self.with_room(|room| room.stage()).await
    }

    pub async fn join(&self, id: i64) -> Result<(), RoomError> {
        self.with_room(|room| room.join(RoomUser::new(UserId(id), Rating::default())))
            .await
    }

    pub async fn act(&self, id: i64, action: UserAction) -> Result<(), RoomError> {
        self.with_room(|room| room.handle_action(UserId(id), action))
            .await
    }

    pub async fn ready_all(&self) {
        self.with_room(|room| {
            let ids: Vec<UserId> = room.users().iter().map(|u| u.user_id).collect();
            for id in ids {
                room.handle_action(id, UserAction::SetAvailability { available: true })
                    .unwrap();
                room.handle_action(id, UserAction::SetReady { ready: true })
                    .unwrap();
            }
        })
        .await;
    }

    /// Everything queued so far.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(o) = self.outbound.try_recv() {
            out.push(o);
        }
        out
    }
}

/// Lets spawned countdown tasks run without moving past any deadline
/// further than `ms(10)` away.
pub async fn settle() {
    tokio::time::sleep(ms(10)).await;
}

pub fn events(outbound: &[Outbound]) -> Vec<(Recipient, MatchEvent)> {
    outbound
        .iter()
        .filter_map(|o| match o {
            Outbound::Event {
                recipient, event, ..
            } => Some((*recipient, event.clone())),
            _ => None,
        })
        .collect()
}

pub fn stages(outbound: &[Outbound]) -> Vec<Stage> {
    events(outbound)
        .into_iter()
        .filter_map(|(_, e)| match e {
            MatchEvent::StageChanged { stage, .. } => Some(stage),
            _ => None,
        })
        .collect()
}
