//! Fixed-interval scheduler for background loops.
//!
//! The hub's matchmaking loop sits on one of these:
//!
//! ```ignore
//! let mut scheduler = TickScheduler::new(TickConfig::every(Duration::from_secs(1)));
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         _ = scheduler.wait_for_tick() => {
//!             run_matchmaking_tick().await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};

/// Configuration for a [`TickScheduler`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. Default: 1 second.
    pub interval: Duration,
    /// Work taking longer than this fraction of the interval is logged.
    /// Default: 0.8.
    pub slow_tick_ratio: f64,
}

impl TickConfig {
    /// Shortest interval accepted; anything below is clamped up.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            tracing::warn!(
                interval_ms = self.interval.as_millis() as u64,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if self.slow_tick_ratio.is_nan() || self.slow_tick_ratio <= 0.0 {
            self.slow_tick_ratio = 1.0;
        }
        self
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            slow_tick_ratio: 0.8,
        }
    }
}

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// Whole intervals that passed without a tick because the previous
    /// work ran long.
    pub skipped: u64,
}

/// Fires on a fixed grid of deadlines. Deadlines that were missed are
/// dropped, never replayed back to back.
pub struct TickScheduler {
    config: TickConfig,
    deadline: Instant,
    work_started: Option<Instant>,
    ticks: u64,
    skipped: u64,
    slowest: Duration,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        Self {
            deadline: Instant::now() + config.interval,
            config,
            work_started: None,
            ticks: 0,
            skipped: 0,
            slowest: Duration::ZERO,
        }
    }

    /// Sleeps until the next deadline.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        time::sleep_until(self.deadline).await;

        let now = Instant::now();
        let interval = self.config.interval;
        let late = now.saturating_duration_since(self.deadline);
        let skipped = (late.as_nanos() / interval.as_nanos()) as u64;
        if skipped > 0 {
            tracing::warn!(
                tick = self.ticks + 1,
                skipped,
                late_ms = late.as_millis() as u64,
                "ticks missed"
            );
        }

        self.deadline += interval * (skipped as u32 + 1);
        self.ticks += 1;
        self.skipped += skipped;
        self.work_started = Some(now);
        TickInfo {
            tick: self.ticks,
            skipped,
        }
    }

    /// Marks the end of the work for the current tick.
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let elapsed = started.elapsed();
        self.slowest = self.slowest.max(elapsed);
        if elapsed.as_secs_f64() > self.config.interval.as_secs_f64() * self.config.slow_tick_ratio {
            tracing::warn!(
                tick = self.ticks,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow tick"
            );
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Total deadlines dropped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Longest work recorded by [`record_tick_end`](Self::record_tick_end).
    pub fn slowest(&self) -> Duration {
        self.slowest
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
