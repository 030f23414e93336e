//! The registry itself: a concurrent map from id to a lock-guarded slot.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::RegistryError;

/// Anything usable as a registry key.
pub trait EntityKey: Copy + Eq + Hash + Display + Send + Sync + 'static {}

impl<K> EntityKey for K where K: Copy + Eq + Hash + Display + Send + Sync + 'static {}

/// Something an [`EntityRegistry`] can hold.
///
/// The registry keeps the latest [`view`](Entity::view) of every non-empty
/// entity next to its lock. A guard that touched the entity refreshes it on
/// release, so [`EntityRegistry::snapshot_all`] never waits on a holder.
pub trait Entity: Send + 'static {
    type View: Send + Sync + 'static;

    fn view(&self) -> Self::View;
}

/// Configuration for an [`EntityRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound on how long [`EntityRegistry::acquire`] waits for a lock.
    ///
    /// Default: 5 seconds. Hitting it means deadlock, overload, or a holder
    /// doing something slow (like I/O) under the lock.
    pub lock_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// The lock-protected cell behind one id.
struct Slot<T> {
    item: Option<T>,
    /// Set by [`EntityGuard::destroy`]. A destroyed slot is never reused;
    /// anyone still queued on its lock must fail.
    destroyed: bool,
}

type SlotRef<T> = Arc<Mutex<Slot<T>>>;
type Entities<K, T> = DashMap<K, SlotRef<T>>;
type Views<K, T> = DashMap<K, Arc<<T as Entity>::View>>;

/// Per-id mutual-exclusion store.
///
/// Slots are created lazily on first acquire (when allowed) and removed by
/// [`EntityGuard::destroy`]. The map itself is a `DashMap`, so lookups for
/// different ids never contend with each other; the per-id lock is a Tokio
/// mutex, so a waiter yields its worker thread instead of spinning.
pub struct EntityRegistry<K: EntityKey, T: Entity> {
    entities: Arc<Entities<K, T>>,
    /// Last published view of each non-empty entity.
    views: Arc<Views<K, T>>,
    config: RegistryConfig,
    /// Human-readable entity kind ("room", "user") for logs and errors.
    kind: &'static str,
}

impl<K: EntityKey, T: Entity> EntityRegistry<K, T> {
    /// Creates an empty registry.
    pub fn new(kind: &'static str, config: RegistryConfig) -> Self {
        Self {
            entities: Arc::new(DashMap::new()),
            views: Arc::new(DashMap::new()),
            config,
            kind,
        }
    }

    /// Waits for exclusive access to `id`.
    ///
    /// # Errors
    /// - [`RegistryError::NotFound`]: `id` isn't tracked and
    ///   `create_if_missing` is false
    /// - [`RegistryError::LockTimeout`]: the lock wasn't free in time
    /// - [`RegistryError::Destroyed`]: the entity was destroyed while we
    ///   were queued on it
    pub async fn acquire(
        &self,
        id: K,
        create_if_missing: bool,
    ) -> Result<EntityGuard<K, T>, RegistryError> {
        // Clone the slot out before doing anything else with the map: a
        // DashMap `Ref` holds its shard lock for as long as it lives.
        let existing = self.entities.get(&id).map(|entry| Arc::clone(entry.value()));

        let slot = match existing {
            Some(slot) => slot,
            None if create_if_missing => Arc::clone(
                self.entities
                    .entry(id)
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(Slot {
                            item: None,
                            destroyed: false,
                        }))
                    })
                    .value(),
            ),
            None => return Err(self.not_found(id)),
        };

        let guard = tokio::time::timeout(
            self.config.lock_timeout,
            Arc::clone(&slot).lock_owned(),
        )
        .await
        .map_err(|_| {
            tracing::error!(
                kind = self.kind,
                %id,
                timeout_ms = self.config.lock_timeout.as_millis() as u64,
                "lock acquisition timed out"
            );
            RegistryError::LockTimeout {
                kind: self.kind,
                id: id.to_string(),
            }
        })?;

        if guard.destroyed {
            return Err(RegistryError::Destroyed {
                kind: self.kind,
                id: id.to_string(),
            });
        }

        Ok(EntityGuard {
            id,
            kind: self.kind,
            slot,
            guard,
            entities: Arc::clone(&self.entities),
            views: Arc::clone(&self.views),
            touched: false,
        })
    }

    /// The latest view of every non-empty entity, held or not.
    ///
    /// For statistics and iteration only. Never takes an entity lock: an
    /// entity being changed right now shows as it was when its last holder
    /// released it. Never use this to decide on a write.
    pub fn snapshot_all(&self) -> Vec<(K, Arc<T::View>)> {
        self.views
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Every tracked id, locked or not.
    pub fn ids(&self) -> Vec<K> {
        self.entities.iter().map(|entry| *entry.key()).collect()
    }

    /// Returns `true` if `id` currently has a slot (empty or not).
    pub fn contains(&self, id: &K) -> bool {
        self.entities.contains_key(id)
    }

    /// Number of tracked slots.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The entity kind this registry was created with.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn not_found(&self, id: K) -> RegistryError {
        RegistryError::NotFound {
            kind: self.kind,
            id: id.to_string(),
        }
    }
}

/// Exclusive access to one entity. Releases the lock on drop, publishing
/// a fresh view first if the entity may have changed.
pub struct EntityGuard<K: EntityKey, T: Entity> {
    id: K,
    kind: &'static str,
    slot: SlotRef<T>,
    guard: OwnedMutexGuard<Slot<T>>,
    entities: Arc<Entities<K, T>>,
    views: Arc<Views<K, T>>,
    /// Set by every `&mut` access.
    touched: bool,
}

impl<K: EntityKey, T: Entity> EntityGuard<K, T> {
    pub fn id(&self) -> K {
        self.id
    }

    /// The tracked item, or `None` for a freshly created slot.
    pub fn item(&self) -> Option<&T> {
        self.guard.item.as_ref()
    }

    pub fn item_mut(&mut self) -> Option<&mut T> {
        self.touched = true;
        self.guard.item.as_mut()
    }

    /// Replaces the tracked item.
    pub fn set_item(&mut self, item: T) {
        self.touched = true;
        self.guard.item = Some(item);
    }

    /// Removes the item, leaving the slot tracked but empty.
    pub fn take_item(&mut self) -> Option<T> {
        self.touched = true;
        self.guard.item.take()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.item.is_none()
    }

    /// Destroys the entity and stops tracking its id.
    ///
    /// Waiters already queued on this slot fail with
    /// [`RegistryError::Destroyed`]. A later acquire with
    /// `create_if_missing` starts over with a fresh, empty slot.
    pub fn destroy(mut self) -> Option<T> {
        self.guard.destroyed = true;
        let item = self.guard.item.take();
        let slot = &self.slot;
        let removed = self
            .entities
            .remove_if(&self.id, |_, tracked| Arc::ptr_eq(tracked, slot));
        if removed.is_some() {
            self.views.remove(&self.id);
        }
        // The id may already belong to a new slot; leave its view alone.
        self.touched = false;
        tracing::debug!(kind = self.kind, id = %self.id, "entity destroyed");
        item
    }
}

impl<K: EntityKey, T: Entity> Drop for EntityGuard<K, T> {
    fn drop(&mut self) {
        // Runs before the lock field is released, so views are published
        // in lock order.
        if !self.touched {
            return;
        }
        match self.guard.item.as_ref() {
            Some(item) => {
                self.views.insert(self.id, Arc::new(item.view()));
            }
            None => {
                self.views.remove(&self.id);
            }
        }
    }
}
