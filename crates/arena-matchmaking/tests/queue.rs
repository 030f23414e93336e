use std::time::Duration;

use arena_matchmaking::{MatchmakingQueue, QueueConfig, QueueError};
use arena_protocol::{PoolId, Rating, UserId};

fn queue(room_size: usize) -> MatchmakingQueue {
    MatchmakingQueue::new(
        PoolId(1),
        QueueConfig {
            room_size,
            ..QueueConfig::default()
        },
    )
}

fn rating(mu: f64) -> Rating {
    Rating::new(mu, 350.0)
}

// =========================================================================
// add / remove
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_add_reports_user_as_added() {
    let mut q = queue(2);
    let bundle = q.add(UserId(1), rating(1500.0));

    assert_eq!(bundle.added, vec![UserId(1)]);
    assert!(q.contains(UserId(1)));
    assert_eq!(q.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_add_twice_is_noop() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    tokio::time::advance(Duration::from_secs(5)).await;

    let bundle = q.add(UserId(1), rating(1800.0));

    assert!(bundle.is_empty());
    assert_eq!(q.len(), 1);
    // The original entry is untouched.
    assert_eq!(q.user(UserId(1)).unwrap().rating.mu, 1500.0);
}

#[tokio::test(start_paused = true)]
async fn test_remove_unknown_user_fails() {
    let mut q = queue(2);
    let err = q.remove(UserId(9)).unwrap_err();
    assert_eq!(err, QueueError::NotQueued(UserId(9)));
}

#[tokio::test(start_paused = true)]
async fn test_remove_grouped_user_returns_others_to_search() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1510.0));
    assert_eq!(q.update().formed.len(), 1);

    let bundle = q.remove(UserId(1)).unwrap();

    assert_eq!(bundle.removed, vec![UserId(1)]);
    assert_eq!(bundle.added, vec![UserId(2)]);
    let other = q.user(UserId(2)).unwrap();
    assert!(other.group.is_none());
    assert!(other.invite_start.is_none());
}

// =========================================================================
// Group formation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_update_room_size_one_forms_single_groups() {
    let mut q = queue(1);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(2500.0));

    let bundle = q.update();

    assert_eq!(bundle.formed.len(), 2);
    assert!(bundle.formed.iter().all(|g| g.users.len() == 1));
}

#[tokio::test(start_paused = true)]
async fn test_update_pairs_close_ratings() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1540.0));

    let bundle = q.update();

    assert_eq!(bundle.formed.len(), 1);
    let group = &bundle.formed[0];
    assert_eq!(group.pool_id, PoolId(1));
    assert_eq!(group.user_ids(), vec![UserId(1), UserId(2)]);
    assert!(q.user(UserId(1)).unwrap().group.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_update_lone_user_forms_nothing() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));

    assert!(q.update().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_update_radius_grows_with_wait_time() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1700.0));

    // 200 apart: radius 50 needs two doublings (30s).
    assert!(q.update().formed.is_empty());

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(q.update().formed.is_empty());

    tokio::time::advance(Duration::from_secs(2)).await;
    let bundle = q.update();
    assert_eq!(bundle.formed.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_prefers_nearest_neighbour() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1540.0));
    q.add(UserId(3), rating(1510.0));

    let bundle = q.update();

    assert_eq!(bundle.formed.len(), 1);
    assert_eq!(bundle.formed[0].user_ids(), vec![UserId(1), UserId(3)]);
    assert!(q.user(UserId(2)).unwrap().group.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_update_forms_several_groups_in_one_tick() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1000.0));
    q.add(UserId(2), rating(2000.0));
    q.add(UserId(3), rating(1010.0));
    q.add(UserId(4), rating(2010.0));

    let bundle = q.update();

    assert_eq!(bundle.formed.len(), 2);
    let mut groups: Vec<_> = bundle.formed.iter().map(|g| g.user_ids()).collect();
    groups.sort();
    assert_eq!(groups, vec![vec![UserId(1), UserId(3)], vec![UserId(2), UserId(4)]]);
}

#[tokio::test(start_paused = true)]
async fn test_update_does_not_regroup_invited_users() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1500.0));
    assert_eq!(q.update().formed.len(), 1);

    q.add(UserId(3), rating(1500.0));
    let bundle = q.update();

    assert!(bundle.formed.is_empty());
}

// =========================================================================
// Invitations
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_accept_by_all_members_completes_group() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1500.0));
    let group_id = q.update().formed[0].id;

    let first = q.mark_invitation_accepted(UserId(1)).unwrap();
    assert!(first.completed.is_empty());
    assert!(q.user(UserId(1)).unwrap().invite_accepted);

    let second = q.mark_invitation_accepted(UserId(2)).unwrap();
    assert_eq!(second.completed.len(), 1);
    assert_eq!(second.completed[0].id, group_id);
    assert_eq!(second.completed[0].users.len(), 2);
    assert!(q.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_accept_without_invitation_fails() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));

    assert_eq!(
        q.mark_invitation_accepted(UserId(1)).unwrap_err(),
        QueueError::NotInvited(UserId(1))
    );
    assert_eq!(
        q.mark_invitation_accepted(UserId(2)).unwrap_err(),
        QueueError::NotQueued(UserId(2))
    );
}

#[tokio::test(start_paused = true)]
async fn test_decline_without_invitation_fails() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));

    assert_eq!(
        q.mark_invitation_declined(UserId(1)).unwrap_err(),
        QueueError::NotInvited(UserId(1))
    );
    assert!(q.contains(UserId(1)));
}

#[tokio::test(start_paused = true)]
async fn test_decline_removes_decliner_and_requeues_others() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1500.0));
    q.update();
    q.mark_invitation_accepted(UserId(2)).unwrap();

    let bundle = q.mark_invitation_declined(UserId(1)).unwrap();

    assert_eq!(bundle.removed, vec![UserId(1)]);
    assert_eq!(bundle.added, vec![UserId(2)]);
    let other = q.user(UserId(2)).unwrap();
    assert!(!other.invite_accepted);
    assert!(other.group.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_invite_timeout_removes_unaccepted_members() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1500.0));
    q.update();
    q.mark_invitation_accepted(UserId(1)).unwrap();

    tokio::time::advance(Duration::from_secs(16)).await;
    let bundle = q.update();

    assert_eq!(bundle.removed, vec![UserId(2)]);
    assert_eq!(bundle.added, vec![UserId(1)]);
    assert!(q.contains(UserId(1)));
    assert!(!q.contains(UserId(2)));
}

#[tokio::test(start_paused = true)]
async fn test_invite_timeout_first_expired_member_dissolves_group() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    q.add(UserId(2), rating(1500.0));
    q.update();

    tokio::time::advance(Duration::from_secs(16)).await;
    let bundle = q.update();

    // User 1 joined first, so their timeout dissolves the group and user 2
    // goes back to searching alone.
    assert_eq!(bundle.removed, vec![UserId(1)]);
    assert_eq!(bundle.added, vec![UserId(2)]);
    assert!(bundle.formed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_requeued_user_keeps_search_start() {
    let mut q = queue(2);
    q.add(UserId(1), rating(1500.0));
    let started = q.user(UserId(1)).unwrap().search_start;
    tokio::time::advance(Duration::from_secs(3)).await;
    q.add(UserId(2), rating(1500.0));
    q.update();

    q.remove(UserId(2)).unwrap();

    assert_eq!(q.user(UserId(1)).unwrap().search_start, started);
}
