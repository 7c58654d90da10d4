//! Rate limiting for weighted prompt submission.
//!
//! Knob drags can produce dozens of prompt snapshots per second. The gate lets
//! the first call in a window through immediately and collapses the rest of the
//! window into one trailing call, so the last snapshot is never lost.

use std::time::Duration;
use tokio::time::Instant;

/// What the caller should do with a call that reached the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Run now.
    Fire,
    /// Run once after the given delay; no trailing call was pending before.
    Defer(Duration),
    /// A trailing call is already pending and will pick up the latest state.
    Coalesced,
}

/// Leading and trailing edge throttle.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_fire: Option<Instant>,
    trailing_pending: bool,
}

impl Throttle {
    /// Create a throttle allowing at most one call per `interval`.
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fire: None,
            trailing_pending: false,
        }
    }

    /// Minimum interval between two fired calls
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide what to do with a call arriving at `now`.
    pub fn poll(&mut self, now: Instant) -> ThrottleDecision {
        if self.trailing_pending {
            return ThrottleDecision::Coalesced;
        }
        match self.last_fire {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.trailing_pending = true;
                ThrottleDecision::Defer(self.interval - now.saturating_duration_since(last))
            }
            _ => {
                self.last_fire = Some(now);
                ThrottleDecision::Fire
            }
        }
    }

    /// Mark the pending trailing call as run at `now`.
    pub fn trailing_fired(&mut self, now: Instant) {
        self.trailing_pending = false;
        self.last_fire = Some(now);
    }

    /// Whether a trailing call is scheduled
    pub const fn has_pending(&self) -> bool {
        self.trailing_pending
    }
}
