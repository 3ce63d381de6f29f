//! Monotonic session clock.

use std::time::Instant;

/// Millisecond clock anchored at session creation.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    epoch: Instant,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    /// Start a clock at zero.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds since the clock started.
    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Current value in the engine's 32-bit wrapping clock domain.
    pub fn engine_clock(&self) -> u32 {
        (self.now_ms() & 0xffff_ffff) as u32
    }
}
