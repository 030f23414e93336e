//! Queue configuration.

use std::time::Duration;

/// Configuration for a [`MatchmakingQueue`](crate::MatchmakingQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Users per group (and per room). Default: 2.
    pub room_size: usize,

    /// Acceptable rating difference for a user who just joined.
    /// Default: 50.
    pub base_radius: f64,

    /// The radius doubles every time a user waits this long.
    /// Default: 15 seconds.
    pub doubling_period: Duration,

    /// How long a formed group waits for every member to accept.
    /// Default: 15 seconds.
    pub invite_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            room_size: 2,
            base_radius: 50.0,
            doubling_period: Duration::from_secs(15),
            invite_timeout: Duration::from_secs(15),
        }
    }
}

impl QueueConfig {
    /// Clamps out-of-range values so the queue can't divide by zero or
    /// form empty groups.
    pub fn validated(mut self) -> Self {
        if self.room_size == 0 {
            tracing::warn!("room_size of 0 is invalid, using 1");
            self.room_size = 1;
        }
        if !(self.base_radius.is_finite() && self.base_radius > 0.0) {
            tracing::warn!(base_radius = self.base_radius, "invalid base_radius, using 1.0");
            self.base_radius = 1.0;
        }
        if self.doubling_period.is_zero() {
            tracing::warn!("doubling_period of 0 is invalid, using 1s");
            self.doubling_period = Duration::from_secs(1);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.room_size, 2);
        assert_eq!(config.invite_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_validated_fixes_degenerate_values() {
        let config = QueueConfig {
            room_size: 0,
            base_radius: f64::NAN,
            doubling_period: Duration::ZERO,
            ..QueueConfig::default()
        }
        .validated();
        assert_eq!(config.room_size, 1);
        assert_eq!(config.base_radius, 1.0);
        assert_eq!(config.doubling_period, Duration::from_secs(1));
    }
}
