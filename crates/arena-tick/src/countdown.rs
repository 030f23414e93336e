//! Cancellable countdowns bound to a registry-tracked host.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arena_registry::{Entity, EntityKey, EntityRegistry};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Name of an exclusivity class. At most one countdown per class is active
/// per host; starting another one stops the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountdownClass(pub &'static str);

impl fmt::Display for CountdownClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Deferred work run with the host locked once a countdown ends.
pub type Continuation<H> = Box<dyn FnOnce(&mut H) + Send + 'static>;

/// An entity that owns countdowns.
///
/// The host lives in an [`EntityRegistry`]; countdown tasks re-acquire it
/// by id when they wake.
pub trait CountdownHost: Entity + Sized {
    type Id: EntityKey;
    /// What a countdown is "for" (e.g. the stage it ends).
    type Tag: Clone + fmt::Debug + Send + Sync + 'static;

    fn countdowns(&mut self) -> &mut Countdowns<Self>;

    /// Called with the host locked whenever a countdown ends and is cleared
    /// (`None`). Hosts typically broadcast this.
    fn countdown_changed(&mut self, countdown: Option<CountdownInfo<Self::Tag>>);
}

/// Read-only view of a countdown.
#[derive(Debug, Clone, PartialEq)]
pub struct CountdownInfo<T> {
    pub id: u64,
    pub class: CountdownClass,
    pub tag: T,
    pub duration: Duration,
    pub remaining: Duration,
}

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

/// Signals shared between a countdown's handle and its task.
struct Signals {
    stop: watch::Sender<bool>,
    skip: watch::Sender<bool>,
    /// When the wait began. Moves forward if the countdown had to wait
    /// for its predecessor.
    wait_started: watch::Sender<Instant>,
    completed: AtomicBool,
}

/// Handle to one scheduled countdown.
///
/// Two independent signals control it: stop aborts it (the continuation
/// never runs) and [`finish`](Self::finish) ends the wait early (the
/// continuation still runs). If both fire, stop wins. Stopping goes through
/// [`Countdowns::stop`] so the set never keeps a dead handle.
#[derive(Clone)]
pub struct Countdown<T> {
    id: u64,
    class: CountdownClass,
    tag: T,
    duration: Duration,
    signals: Arc<Signals>,
}

impl<T: Clone> Countdown<T> {
    fn new(id: u64, class: CountdownClass, tag: T, duration: Duration) -> Self {
        Self {
            id,
            class,
            tag,
            duration,
            signals: Arc::new(Signals {
                stop: watch::Sender::new(false),
                skip: watch::Sender::new(false),
                wait_started: watch::Sender::new(Instant::now()),
                completed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class(&self) -> CountdownClass {
        self.class
    }

    pub fn tag(&self) -> &T {
        &self.tag
    }

    /// Aborts the countdown. Its continuation is guaranteed not to run.
    pub(crate) fn stop(&self) {
        self.signals.stop.send_replace(true);
    }

    /// Skips to the end. The continuation runs as soon as the host's lock
    /// can be taken, unless the countdown is also stopped.
    pub fn finish(&self) {
        self.signals.skip.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.signals.stop.borrow()
    }

    pub fn is_skip_requested(&self) -> bool {
        *self.signals.skip.borrow()
    }

    /// `true` until the countdown is stopped or has been cleared by its task.
    pub fn is_running(&self) -> bool {
        !self.is_stop_requested() && !self.signals.completed.load(Ordering::Acquire)
    }

    /// Time left until the natural deadline. Zero once skipped.
    pub fn remaining_time(&self) -> Duration {
        if self.is_skip_requested() {
            return Duration::ZERO;
        }
        self.deadline().saturating_duration_since(Instant::now())
    }

    pub fn info(&self) -> CountdownInfo<T> {
        CountdownInfo {
            id: self.id,
            class: self.class,
            tag: self.tag.clone(),
            duration: self.duration,
            remaining: self.remaining_time(),
        }
    }

    fn deadline(&self) -> Instant {
        *self.signals.wait_started.borrow() + self.duration
    }

    /// Restarts the clock once the predecessor has gone.
    fn begin_wait(&self) {
        self.signals.wait_started.send_replace(Instant::now());
    }

    fn mark_completed(&self) {
        self.signals.completed.store(true, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Countdowns (the per-host set)
// ---------------------------------------------------------------------------

/// The active countdowns of one host.
///
/// Lives inside the host, so every method runs with the host's lock held.
pub struct Countdowns<H: CountdownHost> {
    host_id: H::Id,
    registry: Weak<EntityRegistry<H::Id, H>>,
    active: Vec<Countdown<H::Tag>>,
    /// Completion of the most recently started countdown of each class.
    /// The next countdown of that class waits on it before its own wait.
    tails: HashMap<CountdownClass, oneshot::Receiver<()>>,
    next_id: u64,
}

impl<H: CountdownHost> Countdowns<H> {
    pub fn new(host_id: H::Id, registry: Weak<EntityRegistry<H::Id, H>>) -> Self {
        Self {
            host_id,
            registry,
            active: Vec::new(),
            tails: HashMap::new(),
            next_id: 0,
        }
    }

    /// Starts a countdown, stopping any active one of the same class.
    ///
    /// The new countdown first waits for the previous countdown of its
    /// class to finish its whole lifecycle (continuation included), so
    /// continuations of one class never overlap. Its full `duration` is
    /// counted from the end of that wait.
    pub fn start(
        &mut self,
        class: CountdownClass,
        tag: H::Tag,
        duration: Duration,
        continuation: Continuation<H>,
    ) -> CountdownInfo<H::Tag> {
        if let Some(previous) = self.remove_class(class) {
            previous.stop();
            tracing::debug!(
                host = %self.host_id,
                %class,
                countdown = previous.id(),
                "countdown superseded"
            );
        }

        self.next_id += 1;
        let countdown = Countdown::new(self.next_id, class, tag, duration);
        let info = countdown.info();

        let Some(registry) = self.registry.upgrade() else {
            tracing::warn!(host = %self.host_id, %class, "registry gone, countdown not scheduled");
            return info;
        };

        let (done_tx, done_rx) = oneshot::channel();
        let prior = self.tails.insert(class, done_rx);

        tokio::spawn(run_countdown(
            registry,
            self.host_id,
            countdown.clone(),
            prior,
            continuation,
            done_tx,
        ));

        tracing::debug!(
            host = %self.host_id,
            %class,
            countdown = countdown.id(),
            duration_ms = duration.as_millis() as u64,
            tag = ?countdown.tag(),
            "countdown started"
        );
        self.active.push(countdown);
        info
    }

    /// Stops the active countdown of `class`. Returns `false` if none.
    pub fn stop(&mut self, class: CountdownClass) -> bool {
        match self.remove_class(class) {
            Some(countdown) => {
                countdown.stop();
                true
            }
            None => false,
        }
    }

    /// Skips the active countdown of `class` to its end. Returns `false` if
    /// none is running.
    pub fn finish(&mut self, class: CountdownClass) -> bool {
        match self.get(class) {
            Some(countdown) if countdown.is_running() => {
                countdown.finish();
                true
            }
            _ => false,
        }
    }

    /// Stops every active countdown.
    pub fn stop_all(&mut self) {
        for countdown in self.active.drain(..) {
            countdown.stop();
        }
    }

    pub fn get(&self, class: CountdownClass) -> Option<&Countdown<H::Tag>> {
        self.active.iter().find(|c| c.class() == class)
    }

    pub fn is_running(&self, class: CountdownClass) -> bool {
        self.get(class).is_some_and(Countdown::is_running)
    }

    pub fn active(&self) -> &[Countdown<H::Tag>] {
        &self.active
    }

    /// Clears a countdown by id. Called by the countdown's own task.
    fn remove(&mut self, id: u64) -> Option<Countdown<H::Tag>> {
        let pos = self.active.iter().position(|c| c.id() == id)?;
        Some(self.active.remove(pos))
    }

    fn remove_class(&mut self, class: CountdownClass) -> Option<Countdown<H::Tag>> {
        let pos = self.active.iter().position(|c| c.class() == class)?;
        Some(self.active.remove(pos))
    }
}

impl<H: CountdownHost> Drop for Countdowns<H> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Body of a countdown task: wait unlocked, then apply locked.
async fn run_countdown<H: CountdownHost>(
    registry: Arc<EntityRegistry<H::Id, H>>,
    host_id: H::Id,
    countdown: Countdown<H::Tag>,
    prior: Option<oneshot::Receiver<()>>,
    continuation: Continuation<H>,
    // Dropped when this function returns, which signals the next countdown
    // of the class.
    _done: oneshot::Sender<()>,
) {
    if let Some(prior) = prior {
        // An error only means the prior task is gone, which is also "done".
        let _ = prior.await;
        countdown.begin_wait();
    }

    let mut stop = countdown.signals.stop.subscribe();
    let mut skip = countdown.signals.skip.subscribe();
    tokio::select! {
        _ = tokio::time::sleep_until(countdown.deadline()) => {}
        _ = stop.wait_for(|stopped| *stopped) => {}
        _ = skip.wait_for(|skipped| *skipped) => {}
    }

    if countdown.is_stop_requested() {
        countdown.mark_completed();
        tracing::debug!(host = %host_id, countdown = countdown.id(), "countdown stopped");
        return;
    }

    let mut guard = match registry.acquire(host_id, false).await {
        Ok(guard) => guard,
        Err(e) => {
            countdown.mark_completed();
            tracing::warn!(host = %host_id, countdown = countdown.id(), error = %e,
                "countdown could not re-acquire its host");
            return;
        }
    };
    let Some(host) = guard.item_mut() else {
        countdown.mark_completed();
        return;
    };

    if host.countdowns().remove(countdown.id()).is_some() {
        host.countdown_changed(None);
    }
    countdown.mark_completed();

    // Stop may have raced with the wake-up while we waited for the lock.
    if countdown.is_stop_requested() {
        tracing::debug!(host = %host_id, countdown = countdown.id(), "countdown stopped");
        return;
    }

    tracing::debug!(host = %host_id, countdown = countdown.id(), tag = ?countdown.tag(),
        "countdown elapsed");
    continuation(host);
}
