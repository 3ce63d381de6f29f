//! Rolling round-trip latency statistics.
//!
//! Every successful round trip appends one timestamp to an unbounded history
//! and one interval to a window of at most [`REPORT_EVERY`] entries. Each time
//! the window fills, an aggregate [`LatencyReport`] is produced and the window
//! is cleared. The timestamp history is kept for the life of the session.

use crate::core::constants::REPORT_EVERY;

/// Aggregate emitted once per [`REPORT_EVERY`] round trips. All values in ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyReport {
    /// Round trips completed when the report was produced.
    pub round_trips: u64,
    /// Largest interval in the window.
    pub max_ms: u64,
    /// Mean interval over the last ten round trips.
    pub avg10_ms: u64,
    /// Mean interval since the session started.
    pub avg_total_ms: u64,
}

/// One recorded round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTrip {
    /// 1-based round-trip number.
    pub index: u64,
    /// Timestamp of the echo, in session-clock milliseconds.
    pub timestamp_ms: u64,
    /// Time since the previous sample.
    pub interval_ms: u64,
    /// Present on every tenth round trip.
    pub report: Option<LatencyReport>,
}

/// Latency collector for one session.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    /// Sample timestamps. `samples[0]` is the initial send.
    samples: Vec<u64>,
    /// Intervals since the last report.
    window: Vec<u64>,
    /// Every report produced so far.
    reports: Vec<LatencyReport>,
}

impl LatencyStats {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            window: Vec::with_capacity(REPORT_EVERY),
            reports: Vec::new(),
        }
    }

    /// Record the send edge that opens the first round trip.
    ///
    /// Returns the timestamp actually stored.
    pub fn record_start(&mut self, now_ms: u64) -> u64 {
        self.push_sample(now_ms)
    }

    /// Record a successful echo.
    ///
    /// Returns `None` if no start sample was recorded yet.
    pub fn record_round_trip(&mut self, now_ms: u64) -> Option<RoundTrip> {
        let previous = *self.samples.last()?;
        let timestamp_ms = self.push_sample(now_ms);
        let interval_ms = timestamp_ms - previous;
        self.window.push(interval_ms);

        let report = if self.window.len() >= REPORT_EVERY {
            let report = self.aggregate();
            self.reports.push(report);
            self.window.clear();
            Some(report)
        } else {
            None
        };

        Some(RoundTrip {
            index: self.round_trips(),
            timestamp_ms,
            interval_ms,
            report,
        })
    }

    /// Completed round trips.
    pub fn round_trips(&self) -> u64 {
        self.samples.len().saturating_sub(1) as u64
    }

    /// Full timestamp history.
    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    /// Intervals since the last report.
    pub fn window(&self) -> &[u64] {
        &self.window
    }

    /// Reports produced so far.
    pub fn reports(&self) -> &[LatencyReport] {
        &self.reports
    }

    // Millisecond clocks can repeat a value; samples must strictly increase.
    fn push_sample(&mut self, now_ms: u64) -> u64 {
        let timestamp = match self.samples.last() {
            Some(&last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.samples.push(timestamp);
        timestamp
    }

    fn aggregate(&self) -> LatencyReport {
        let last = self.samples.len() - 1;
        let count = REPORT_EVERY as u64;
        LatencyReport {
            round_trips: self.round_trips(),
            max_ms: self.window.iter().copied().max().unwrap_or(0),
            avg10_ms: (self.samples[last] - self.samples[last - REPORT_EVERY]) / count,
            avg_total_ms: (self.samples[last] - self.samples[0]) / last as u64,
        }
    }
}
