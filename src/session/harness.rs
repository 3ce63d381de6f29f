//! Self-clocking echo test.
//!
//! The harness sends one fixed message, waits for the peer to echo it back,
//! records the round trip and immediately sends it again. Exactly one send is
//! issued per valid echo, so the loop needs no external driver once started.
//!
//! A message that does not match is discarded without a resend. Nothing else
//! re-triggers the loop, so one mismatch stalls the benchmark. A rejected send
//! stalls it the same way.

use tracing::warn;

use super::stats::{LatencyStats, RoundTrip};
use crate::engine::{NegativeReturn, ReliabilityEngine};

/// The fixed echo payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoMessage {
    bytes: Box<[u8]>,
}

impl EchoMessage {
    /// Repeat `pattern` until the message is exactly `len` bytes long.
    ///
    /// An empty pattern produces zero bytes.
    pub fn repeating(pattern: &[u8], len: usize) -> Self {
        let bytes = pattern.iter().copied().cycle().take(len).collect();
        Self { bytes }
    }

    /// Message content.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Message length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the message is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `received` is an exact echo of this message.
    pub fn matches(&self, received: &[u8]) -> bool {
        *self.bytes == *received
    }
}

/// Harness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    /// Nothing sent yet.
    Idle,
    /// A valid echo arrived and the next send is being issued.
    Armed,
    /// A message is in flight (or the loop has stalled).
    Waiting,
}

/// Result of handing one received message to the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoOutcome {
    /// Valid echo: the round trip was recorded and the message re-sent.
    RoundTrip {
        /// The recorded sample.
        round_trip: RoundTrip,
        /// Result of the follow-up send.
        resend: Result<(), NegativeReturn>,
    },
    /// Content did not match; discarded with no resend.
    Mismatch {
        /// Length of the discarded message.
        len: usize,
    },
    /// A message arrived before the harness was started.
    Unexpected,
}

/// Echo test state machine.
#[derive(Debug, Clone)]
pub struct EchoHarness {
    message: EchoMessage,
    state: HarnessState,
    stats: LatencyStats,
    sends: u64,
    mismatches: u64,
    rejected_sends: u64,
}

impl EchoHarness {
    /// Create a harness that echoes `message`.
    pub fn new(message: EchoMessage) -> Self {
        Self {
            message,
            state: HarnessState::Idle,
            stats: LatencyStats::new(),
            sends: 0,
            mismatches: 0,
            rejected_sends: 0,
        }
    }

    /// Record the first sample and issue the first send.
    ///
    /// Calling this more than once has no effect.
    pub fn start<E>(&mut self, engine: &mut E, now_ms: u64) -> Result<(), NegativeReturn>
    where
        E: ReliabilityEngine + ?Sized,
    {
        if self.state != HarnessState::Idle {
            return Ok(());
        }
        self.stats.record_start(now_ms);
        self.state = HarnessState::Waiting;
        self.send(engine)
    }

    /// Validate a message pulled from the engine.
    pub fn on_message<E>(&mut self, received: &[u8], engine: &mut E, now_ms: u64) -> EchoOutcome
    where
        E: ReliabilityEngine + ?Sized,
    {
        if self.state == HarnessState::Idle {
            return EchoOutcome::Unexpected;
        }

        if !self.message.matches(received) {
            self.mismatches += 1;
            return EchoOutcome::Mismatch {
                len: received.len(),
            };
        }

        let Some(round_trip) = self.stats.record_round_trip(now_ms) else {
            return EchoOutcome::Unexpected;
        };

        self.state = HarnessState::Armed;
        let resend = self.send(engine);
        self.state = HarnessState::Waiting;

        EchoOutcome::RoundTrip { round_trip, resend }
    }

    /// Current state.
    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// The echo payload.
    pub fn message(&self) -> &EchoMessage {
        &self.message
    }

    /// Latency statistics.
    pub fn stats(&self) -> &LatencyStats {
        &self.stats
    }

    /// Completed round trips.
    pub fn round_trips(&self) -> u64 {
        self.stats.round_trips()
    }

    /// Sends the engine accepted.
    pub fn sends(&self) -> u64 {
        self.sends
    }

    /// Messages discarded for not matching.
    pub fn mismatches(&self) -> u64 {
        self.mismatches
    }

    /// Sends the engine refused.
    pub fn rejected_sends(&self) -> u64 {
        self.rejected_sends
    }

    fn send<E>(&mut self, engine: &mut E) -> Result<(), NegativeReturn>
    where
        E: ReliabilityEngine + ?Sized,
    {
        let result = engine.send_message(self.message.as_bytes());
        match &result {
            Ok(()) => self.sends += 1,
            Err(e) => {
                self.rejected_sends += 1;
                warn!(error = %e, len = self.message.len(), "echo send rejected, loop stalled");
            }
        }
        result
    }
}
