//! Collaborators the hub calls out to.
//!
//! Arena doesn't store anything, deliver anything, or compute scores
//! itself. It calls these traits, always without holding a room, session
//! or queue lock. Implement them over your database, your connection
//! layer and your score store; tests use in-memory fakes.

use std::future::Future;

use arena_protocol::{
    ItemId, MatchEvent, PoolId, QueueEvent, Rating, RoomId, UserId,
};
use arena_room::RoomRecord;
use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// A user's rating and match count in one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub pool_id: PoolId,
    pub rating: Rating,
    pub matches_played: u32,
}

impl UserStats {
    /// Stats for a user who has never played in `pool_id`.
    pub fn new(user_id: UserId, pool_id: PoolId) -> Self {
        Self {
            user_id,
            pool_id,
            rating: Rating::default(),
            matches_played: 0,
        }
    }
}

/// A room to create for a completed matchmaking group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRoom {
    pub pool_id: PoolId,
    pub users: Vec<UserId>,
}

/// Anything sent to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserEvent {
    /// Private room data, e.g. a card hand.
    Match(MatchEvent),
    Queue(QueueEvent),
}

/// Storage for rooms, playlists and ratings.
pub trait Persistence: Send + Sync + 'static {
    fn load_room(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<RoomRecord, ServiceError>> + Send;

    fn mark_room_active(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn record_played_item(
        &self,
        room_id: RoomId,
        item_id: ItemId,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn load_or_create_user_stats(
        &self,
        user_id: UserId,
        pool_id: PoolId,
    ) -> impl Future<Output = Result<UserStats, ServiceError>> + Send;

    fn save_user_stats(
        &self,
        stats: UserStats,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Creates the room record for a completed matchmaking group and
    /// returns its id. The room's required users are `request.users`.
    fn create_room(
        &self,
        request: NewRoom,
    ) -> impl Future<Output = Result<RoomId, ServiceError>> + Send;
}

/// Delivers events to connected clients.
pub trait Notifier: Send + Sync + 'static {
    fn broadcast_to_room(
        &self,
        room_id: RoomId,
        event: MatchEvent,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn send_to_user(
        &self,
        user_id: UserId,
        event: UserEvent,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// Where gameplay scores come from.
pub trait ScoreSource: Send + Sync + 'static {
    /// Total score per user for the most recent play of `item_id`.
    fn get_scores_for_item(
        &self,
        item_id: ItemId,
    ) -> impl Future<Output = Result<Vec<(UserId, u64)>, ServiceError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_event_serializes_without_wrapper() {
        let event = UserEvent::Queue(QueueEvent::RoomReady { room_id: RoomId(5) });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "RoomReady", "room_id": 5 }));
    }

    #[test]
    fn test_new_stats_start_at_initial_rating() {
        let stats = UserStats::new(UserId(1), PoolId(2));
        assert_eq!(stats.rating, Rating::default());
        assert_eq!(stats.matches_played, 0);
    }
}
