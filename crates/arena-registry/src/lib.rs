//! Keyed entity registry for Arena.
//!
//! Every shared, mutable object in the server (a room, a user's session)
//! lives in an [`EntityRegistry`] slot. The only way to touch it is to
//! [`acquire`](EntityRegistry::acquire) the slot, which hands out an
//! [`EntityGuard`] holding that id's lock. Dropping the guard releases it.
//!
//! ```text
//! absent ──acquire(create)──→ tracked/unlocked ⇄ tracked/locked ──destroy──→ destroyed
//! ```
//!
//! [`snapshot_all`](EntityRegistry::snapshot_all) reads each entity's last
//! published [`Entity::view`] instead, so statistics never queue behind a
//! holder.
//!
//! Waits are bounded: an acquire that can't get the lock within
//! [`RegistryConfig::lock_timeout`] fails with
//! [`RegistryError::LockTimeout`] instead of queueing forever.

mod error;
mod registry;

pub use error::RegistryError;
pub use registry::{Entity, EntityGuard, EntityKey, EntityRegistry, RegistryConfig};
