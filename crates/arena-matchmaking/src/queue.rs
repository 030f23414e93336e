//! The matchmaking queue for one rating pool.

use std::collections::HashMap;

use arena_protocol::{GroupId, PoolId, Rating, UserId};
use tokio::time::Instant;

use crate::{QueueConfig, QueueError, search_radius};

/// A user waiting in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueUser {
    pub user_id: UserId,
    pub rating: Rating,
    /// When the user started searching. Kept across a dissolved group, so
    /// a returned user's radius keeps growing instead of starting over.
    pub search_start: Instant,
    /// When the user's current group was formed.
    pub invite_start: Option<Instant>,
    pub invite_accepted: bool,
    /// The group the user is currently invited into. At most one.
    pub group: Option<GroupId>,
}

/// A set of `room_size` users proposed as a future room.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueGroup {
    pub id: GroupId,
    pub pool_id: PoolId,
    /// Members in ascending rating order.
    pub users: Vec<QueueUser>,
}

impl QueueGroup {
    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|u| u.user_id).collect()
    }
}

/// What changed as the result of one queue operation.
///
/// "Added" means the user is (again) actively searching; "removed" means
/// they have left the queue for good.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueUpdateBundle {
    pub added: Vec<UserId>,
    pub removed: Vec<UserId>,
    pub formed: Vec<QueueGroup>,
    pub completed: Vec<QueueGroup>,
}

impl QueueUpdateBundle {
    pub fn merge(&mut self, other: QueueUpdateBundle) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
        self.formed.extend(other.formed);
        self.completed.extend(other.completed);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.formed.is_empty()
            && self.completed.is_empty()
    }
}

/// In-memory pool of users searching for a match in one rating pool.
///
/// Not thread-safe on its own: the owner keeps it behind a single lock so
/// every operation, including the periodic [`update`](Self::update), is
/// serialized.
pub struct MatchmakingQueue {
    pool_id: PoolId,
    config: QueueConfig,
    /// Queued users in join order.
    users: Vec<QueueUser>,
    /// Members of each unfinished group.
    groups: HashMap<GroupId, Vec<UserId>>,
    next_group_id: u64,
}

impl MatchmakingQueue {
    pub fn new(pool_id: PoolId, config: QueueConfig) -> Self {
        Self {
            pool_id,
            config: config.validated(),
            users: Vec::new(),
            groups: HashMap::new(),
            next_group_id: 1,
        }
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Starts searching for `user_id`. Adding a user who is already queued
    /// changes nothing and returns an empty bundle.
    pub fn add(&mut self, user_id: UserId, rating: Rating) -> QueueUpdateBundle {
        let mut bundle = QueueUpdateBundle::default();
        if self.contains(user_id) {
            return bundle;
        }

        self.users.push(QueueUser {
            user_id,
            rating,
            search_start: Instant::now(),
            invite_start: None,
            invite_accepted: false,
            group: None,
        });
        bundle.added.push(user_id);
        tracing::debug!(pool = %self.pool_id, %user_id, mu = rating.mu, "user queued");
        bundle
    }

    /// Removes `user_id`. If they were in an unfinished group, every other
    /// member goes back to searching.
    pub fn remove(&mut self, user_id: UserId) -> Result<QueueUpdateBundle, QueueError> {
        let pos = self
            .users
            .iter()
            .position(|u| u.user_id == user_id)
            .ok_or(QueueError::NotQueued(user_id))?;
        let user = self.users.remove(pos);

        let mut bundle = QueueUpdateBundle::default();
        bundle.removed.push(user_id);
        if let Some(group_id) = user.group {
            self.dissolve(group_id, &mut bundle);
        }
        tracing::debug!(pool = %self.pool_id, %user_id, "user left queue");
        Ok(bundle)
    }

    /// Declines the user's pending invitation: same effect as
    /// [`remove`](Self::remove), but only valid while invited.
    pub fn mark_invitation_declined(
        &mut self,
        user_id: UserId,
    ) -> Result<QueueUpdateBundle, QueueError> {
        let user = self.user(user_id).ok_or(QueueError::NotQueued(user_id))?;
        if user.group.is_none() {
            return Err(QueueError::NotInvited(user_id));
        }
        self.remove(user_id)
    }

    /// Accepts the user's pending invitation. When this makes every member
    /// of the group accepted, the group leaves the queue as "completed".
    pub fn mark_invitation_accepted(
        &mut self,
        user_id: UserId,
    ) -> Result<QueueUpdateBundle, QueueError> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.user_id == user_id)
            .ok_or(QueueError::NotQueued(user_id))?;
        let group_id = user.group.ok_or(QueueError::NotInvited(user_id))?;
        user.invite_accepted = true;

        let mut bundle = QueueUpdateBundle::default();
        let members = self.groups.get(&group_id).cloned().unwrap_or_default();
        let all_accepted = members
            .iter()
            .all(|id| self.user(*id).is_some_and(|u| u.invite_accepted));

        if all_accepted {
            self.groups.remove(&group_id);
            let mut users = Vec::with_capacity(members.len());
            for id in &members {
                if let Some(pos) = self.users.iter().position(|u| u.user_id == *id) {
                    users.push(self.users.remove(pos));
                }
            }
            tracing::info!(pool = %self.pool_id, group = %group_id, users = users.len(),
                "group completed");
            bundle.completed.push(QueueGroup {
                id: group_id,
                pool_id: self.pool_id,
                users,
            });
        }
        Ok(bundle)
    }

    /// The periodic tick.
    ///
    /// 1. Invitations older than `invite_timeout` that were never accepted
    ///    are declined, in join order. Once a group is dissolved, its other
    ///    members are no longer invited and go back to searching.
    /// 2. Ungrouped users are grouped by rating proximity (see
    ///    [`form_groups`](Self::form_groups)).
    pub fn update(&mut self) -> QueueUpdateBundle {
        let now = Instant::now();
        let mut bundle = QueueUpdateBundle::default();

        let expired: Vec<UserId> = self
            .users
            .iter()
            .filter(|u| u.group.is_some() && !u.invite_accepted)
            .filter(|u| {
                u.invite_start
                    .is_some_and(|t| now.duration_since(t) >= self.config.invite_timeout)
            })
            .map(|u| u.user_id)
            .collect();

        for user_id in expired {
            // An earlier timeout may already have dissolved this group.
            if self.user(user_id).is_some_and(|u| u.group.is_some()) {
                tracing::info!(pool = %self.pool_id, %user_id, "invitation timed out");
                if let Ok(declined) = self.mark_invitation_declined(user_id) {
                    bundle.merge(declined);
                }
            }
        }

        self.form_groups(now, &mut bundle);
        bundle
    }

    /// Groups ungrouped users.
    ///
    /// Candidates are sorted by rating mean. Pivots are taken longest-waiting
    /// first; from each pivot a two-pointer window grows outward, always
    /// taking the nearer neighbour, until it holds `room_size` users or the
    /// next neighbour is outside the pivot's search radius. Only full
    /// windows become groups, and their members are out of play for the
    /// rest of the tick. O(n²) in the number of ungrouped users.
    fn form_groups(&mut self, now: Instant, bundle: &mut QueueUpdateBundle) {
        let room_size = self.config.room_size;

        // Indices into `self.users`, by ascending mu (join order on ties).
        let mut candidates: Vec<usize> = (0..self.users.len())
            .filter(|&i| self.users[i].group.is_none())
            .collect();
        candidates.sort_by(|&a, &b| self.users[a].rating.mu.total_cmp(&self.users[b].rating.mu));

        let n = candidates.len();
        let mu = |pos: usize| self.users[candidates[pos]].rating.mu;

        let mut pivots: Vec<usize> = (0..n).collect();
        pivots.sort_by_key(|&pos| self.users[candidates[pos]].search_start);

        let mut taken = vec![false; n];
        let mut formed: Vec<Vec<usize>> = Vec::new();

        for pivot in pivots {
            if taken[pivot] {
                continue;
            }
            let pivot_user = &self.users[candidates[pivot]];
            let radius = search_radius(
                self.config.base_radius,
                self.config.doubling_period,
                now.duration_since(pivot_user.search_start),
            );
            let pivot_mu = pivot_user.rating.mu;

            let mut window = vec![pivot];
            let mut lo = pivot.checked_sub(1);
            let mut hi = pivot + 1;

            while window.len() < room_size {
                while let Some(l) = lo.filter(|&l| taken[l]) {
                    lo = l.checked_sub(1);
                }
                while hi < n && taken[hi] {
                    hi += 1;
                }

                let lo_dist = lo.map(|l| pivot_mu - mu(l));
                let hi_dist = (hi < n).then(|| mu(hi) - pivot_mu);

                let (next, dist) = match (lo_dist, hi_dist) {
                    (Some(ld), Some(hd)) if ld <= hd => (lo, ld),
                    (_, Some(hd)) => (Some(hi), hd),
                    (Some(ld), None) => (lo, ld),
                    (None, None) => break,
                };
                let Some(next) = next else { break };
                if dist > radius {
                    break;
                }

                window.push(next);
                if Some(next) == lo {
                    lo = next.checked_sub(1);
                } else {
                    hi += 1;
                }
            }

            if window.len() == room_size {
                for &pos in &window {
                    taken[pos] = true;
                }
                window.sort_unstable();
                formed.push(window.into_iter().map(|pos| candidates[pos]).collect());
            }
        }

        for members in formed {
            let group_id = GroupId(self.next_group_id);
            self.next_group_id += 1;

            let mut users = Vec::with_capacity(members.len());
            for index in members {
                let user = &mut self.users[index];
                user.group = Some(group_id);
                user.invite_start = Some(now);
                user.invite_accepted = false;
                users.push(user.clone());
            }

            let group = QueueGroup {
                id: group_id,
                pool_id: self.pool_id,
                users,
            };
            self.groups.insert(group_id, group.user_ids());
            tracing::info!(pool = %self.pool_id, group = %group_id, users = ?group.user_ids(),
                "group formed");
            bundle.formed.push(group);
        }
    }

    /// Returns every other member to searching and forgets the group.
    fn dissolve(&mut self, group_id: GroupId, bundle: &mut QueueUpdateBundle) {
        let Some(members) = self.groups.remove(&group_id) else {
            return;
        };
        for member in members {
            if let Some(user) = self.users.iter_mut().find(|u| u.user_id == member) {
                user.group = None;
                user.invite_start = None;
                user.invite_accepted = false;
                bundle.added.push(member);
            }
        }
        tracing::debug!(pool = %self.pool_id, group = %group_id, "group dissolved");
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.user(user_id).is_some()
    }

    pub fn user(&self, user_id: UserId) -> Option<&QueueUser> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    pub fn users(&self) -> &[QueueUser] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
