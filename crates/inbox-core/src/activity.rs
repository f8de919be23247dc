//! Last-user-activity timestamp.

use std::time::{Duration, Instant};

/// Tracks the most recent user interaction. The stored instant never
/// moves backwards, even if callers deliver timestamps out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityTracker {
    last_activity_at: Instant,
}

impl ActivityTracker {
    /// Start tracking with `now` as the initial activity (mount counts as activity).
    pub fn new(now: Instant) -> Self {
        Self {
            last_activity_at: now,
        }
    }

    /// Record activity at `now`. Returns `true` if the timestamp advanced.
    pub fn touch(&mut self, now: Instant) -> bool {
        if now > self.last_activity_at {
            self.last_activity_at = now;
            true
        } else {
            false
        }
    }

    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Time since the last activity, zero if `now` precedes it.
    pub fn since(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity_at)
    }
}
