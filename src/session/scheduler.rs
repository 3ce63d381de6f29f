//! Fixed-cadence maintenance tick.
//!
//! The engine keeps no time of its own; this scheduler wakes the session at a
//! steady cadence so that retransmissions and acks make progress whether or
//! not datagrams arrive. The underlying interval re-arms itself at every fire,
//! before the caller runs its update, so slow update work cannot starve the
//! next tick. Missed ticks are not replayed in a burst.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Periodic tick source bound to a session's stop flag.
#[derive(Debug)]
pub struct MaintenanceScheduler {
    interval: Interval,
    shutdown: CancellationToken,
    fired: u64,
}

impl MaintenanceScheduler {
    /// Create a scheduler firing every `period`. The first fire is immediate.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn new(period: Duration, shutdown: CancellationToken) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            shutdown,
            fired: 0,
        }
    }

    /// Wait for the next fire.
    ///
    /// Returns the fire count, or `None` once the session is stopped. A fire
    /// that was already pending when the stop arrived is swallowed. Cancel
    /// safe.
    pub async fn tick(&mut self) -> Option<u64> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        self.interval.tick().await;
        if self.shutdown.is_cancelled() {
            return None;
        }
        self.fired += 1;
        Some(self.fired)
    }

    /// Number of fires delivered so far.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Configured period.
    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Whether the session has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
