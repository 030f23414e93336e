//! Hub counters.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters the hub keeps up to date. Share one through
/// [`ArenaBuilder::metrics`](crate::ArenaBuilder::metrics) to read them
/// from outside.
#[derive(Debug, Default)]
pub struct ArenaMetrics {
    connected_users: AtomicUsize,
    active_rooms: AtomicUsize,
    queued_users: AtomicUsize,
    groups_completed: AtomicUsize,
}

/// A point-in-time copy of [`ArenaMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Users with a live session (in a room or a queue).
    pub connected_users: usize,
    pub active_rooms: usize,
    pub queued_users: usize,
    /// Groups that completed since startup.
    pub groups_completed: usize,
}

impl ArenaMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connected_users: self.connected_users.load(Ordering::Relaxed),
            active_rooms: self.active_rooms.load(Ordering::Relaxed),
            queued_users: self.queued_users.load(Ordering::Relaxed),
            groups_completed: self.groups_completed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn user_connected(&self) {
        self.connected_users.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn user_disconnected(&self) {
        decrement(&self.connected_users, 1);
    }

    pub(crate) fn room_opened(&self) {
        self.active_rooms.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn room_closed(&self) {
        decrement(&self.active_rooms, 1);
    }

    /// Applies the change in one queue's length across an operation.
    pub(crate) fn queue_resized(&self, before: usize, after: usize) {
        if after > before {
            self.queued_users.fetch_add(after - before, Ordering::Relaxed);
        } else {
            decrement(&self.queued_users, before - after);
        }
    }

    pub(crate) fn group_completed(&self) {
        self.groups_completed.fetch_add(1, Ordering::Relaxed);
    }
}

fn decrement(counter: &AtomicUsize, by: usize) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_sub(by))
    });
}
