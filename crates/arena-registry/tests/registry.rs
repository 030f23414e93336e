//! Integration tests for the entity registry.
//!
//! Lock timeouts are exercised with paused Tokio time, so the 5-second
//! bound elapses instantly once every task is idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use arena_registry::{Entity, EntityRegistry, RegistryConfig, RegistryError};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Name(String);

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl Entity for Name {
    type View = String;

    fn view(&self) -> String {
        self.0.clone()
    }
}

struct Counter(u32);

impl Entity for Counter {
    type View = u32;

    fn view(&self) -> u32 {
        self.0
    }
}

fn registry() -> EntityRegistry<u64, Name> {
    EntityRegistry::new("room", RegistryConfig::default())
}

// =========================================================================
// acquire()
// =========================================================================

#[tokio::test]
async fn test_acquire_missing_without_create_is_not_found() {
    let reg = registry();
    let result = reg.acquire(1, false).await;
    assert!(matches!(result, Err(RegistryError::NotFound { kind: "room", .. })));
    assert!(!reg.contains(&1));
}

#[tokio::test]
async fn test_acquire_with_create_starts_empty() {
    let reg = registry();
    let guard = reg.acquire(1, true).await.unwrap();
    assert_eq!(guard.id(), 1);
    assert!(guard.is_empty());
    assert!(reg.contains(&1));
}

#[tokio::test]
async fn test_item_survives_release() {
    let reg = registry();
    {
        let mut guard = reg.acquire(1, true).await.unwrap();
        guard.set_item("lobby".into());
    }

    let mut guard = reg.acquire(1, false).await.unwrap();
    assert_eq!(guard.item(), Some(&Name::from("lobby")));
    guard.item_mut().unwrap().0.push_str("-2");
    assert_eq!(guard.take_item(), Some(Name::from("lobby-2")));
    assert!(guard.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_acquire_times_out_while_held() {
    let reg = registry();
    let _held = reg.acquire(1, true).await.unwrap();

    let result = reg.acquire(1, false).await;
    assert!(matches!(result, Err(RegistryError::LockTimeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_custom_lock_timeout_is_honoured() {
    let reg: EntityRegistry<u64, Name> = EntityRegistry::new(
        "user",
        RegistryConfig {
            lock_timeout: Duration::from_millis(100),
        },
    );
    let _held = reg.acquire(7, true).await.unwrap();

    let start = tokio::time::Instant::now();
    let result = reg.acquire(7, true).await;
    assert!(matches!(result, Err(RegistryError::LockTimeout { kind: "user", .. })));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_never_yields_two_handles() {
    let reg = Arc::new(EntityRegistry::<u64, Counter>::new(
        "counter",
        RegistryConfig::default(),
    ));
    let holders = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let reg = Arc::clone(&reg);
        let holders = Arc::clone(&holders);
        tasks.push(tokio::spawn(async move {
            let mut guard = reg.acquire(1, true).await.unwrap();
            assert_eq!(holders.fetch_add(1, Ordering::SeqCst), 0, "two live handles");
            let value = guard.item().map_or(0, |c| c.0);
            tokio::task::yield_now().await;
            guard.set_item(Counter(value + 1));
            holders.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let guard = reg.acquire(1, false).await.unwrap();
    assert_eq!(guard.item().map(|c| c.0), Some(32));
}

#[tokio::test]
async fn test_different_ids_do_not_block_each_other() {
    let reg = registry();
    let _a = reg.acquire(1, true).await.unwrap();
    let b = tokio::time::timeout(Duration::from_millis(50), reg.acquire(2, true)).await;
    assert!(b.is_ok(), "unrelated id should be acquirable immediately");
}

// =========================================================================
// destroy()
// =========================================================================

#[tokio::test]
async fn test_destroy_then_create_gives_fresh_entity() {
    let reg = registry();
    let mut guard = reg.acquire(1, true).await.unwrap();
    guard.set_item("old".into());
    assert_eq!(guard.destroy(), Some(Name::from("old")));
    assert!(!reg.contains(&1));

    assert!(matches!(
        reg.acquire(1, false).await,
        Err(RegistryError::NotFound { .. })
    ));

    let fresh = reg.acquire(1, true).await.unwrap();
    assert!(fresh.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_waiter_on_destroyed_entity_fails() {
    let reg = Arc::new(registry());
    let mut guard = reg.acquire(1, true).await.unwrap();
    guard.set_item("doomed".into());

    let waiter = {
        let reg = Arc::clone(&reg);
        tokio::spawn(async move { reg.acquire(1, true).await.map(|g| g.id()) })
    };

    // Let the waiter queue up on the slot's lock.
    tokio::time::sleep(Duration::from_millis(10)).await;
    guard.destroy();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(RegistryError::Destroyed { .. })));
}

// =========================================================================
// snapshot_all()
// =========================================================================

fn names(reg: &EntityRegistry<u64, Name>) -> Vec<(u64, String)> {
    let mut seen: Vec<(u64, String)> = reg
        .snapshot_all()
        .into_iter()
        .map(|(id, view)| (id, view.as_ref().clone()))
        .collect();
    seen.sort();
    seen
}

#[tokio::test]
async fn test_snapshot_includes_held_and_skips_empty_entities() {
    let reg = registry();
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        let mut guard = reg.acquire(id, true).await.unwrap();
        guard.set_item(name.into());
    }
    let _empty = reg.acquire(4, true).await.map(drop);
    let _held = reg.acquire(3, false).await.unwrap();

    assert_eq!(
        names(&reg),
        vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())]
    );
    assert_eq!(reg.len(), 4);
}

#[tokio::test]
async fn test_snapshot_shows_last_released_state() {
    let reg = registry();
    let mut guard = reg.acquire(1, true).await.unwrap();
    guard.set_item("before".into());
    drop(guard);

    let mut guard = reg.acquire(1, false).await.unwrap();
    guard.item_mut().unwrap().0 = "during".into();
    // Read while held: the change isn't visible yet.
    assert_eq!(names(&reg), vec![(1, "before".to_string())]);
    drop(guard);
    assert_eq!(names(&reg), vec![(1, "during".to_string())]);

    let mut guard = reg.acquire(1, false).await.unwrap();
    guard.take_item();
    drop(guard);
    assert!(names(&reg).is_empty());
}

#[tokio::test]
async fn test_destroyed_entity_leaves_snapshot() {
    let reg = registry();
    let mut guard = reg.acquire(1, true).await.unwrap();
    guard.set_item("gone".into());
    drop(guard);
    assert_eq!(names(&reg).len(), 1);

    reg.acquire(1, false).await.unwrap().destroy();
    assert!(names(&reg).is_empty());
}

#[tokio::test]
async fn test_ids_include_held_entities() {
    let reg = registry();
    let mut guard = reg.acquire(7, true).await.unwrap();
    guard.set_item("held".into());
    let _ = reg.acquire(8, true).await.map(drop);

    let mut ids = reg.ids();
    ids.sort();
    assert_eq!(ids, vec![7, 8]);
}
