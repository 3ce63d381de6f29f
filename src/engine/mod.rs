//! Reliability engine interface.
//!
//! The session driver never looks inside the ARQ machinery. It talks to it
//! through [`ReliabilityEngine`], and the engine talks back through a
//! [`SegmentSink`] it owns. The sink is the explicit context for the output
//! callback: each engine carries its own, so several sessions can coexist in
//! one process without shared state.
//!
//! [`KcpEngine`] is the production implementation, backed by the `kcp` crate.

mod config;
mod error;
mod kcp;

pub use config::EngineConfig;
pub use error::NegativeReturn;
pub use self::kcp::{CMD_PUSH, KcpEngine, SegmentHeader, segment_headers};

/// Receiver of outbound segments produced by an engine.
///
/// Called synchronously from inside [`ReliabilityEngine::update`] and
/// occasionally [`ReliabilityEngine::send_message`]. Implementations must not
/// block and must not call back into the engine. A sink backed by a
/// non-blocking socket drops segments emitted before the socket is writable;
/// the engine's retransmission recovers them.
pub trait SegmentSink {
    /// Hand one segment to the transport.
    fn emit(&mut self, segment: &[u8]);
}

/// Ordered, retransmitted message delivery over an unreliable transport.
///
/// All methods are non-blocking. The engine keeps no clock of its own, so
/// [`update`](Self::update) must be called at a steady cadence.
pub trait ReliabilityEngine {
    /// Conversation this engine belongs to.
    fn conversation_id(&self) -> u32;

    /// Ingest one received datagram. Malformed input is absorbed silently.
    fn feed_inbound(&mut self, datagram: &[u8]);

    /// Copy the next fully reassembled message into `buf`.
    ///
    /// Returns `None` when no message is ready.
    fn pull_message<'a>(&mut self, buf: &'a mut [u8]) -> Option<&'a [u8]>;

    /// Queue a message for transmission.
    fn send_message(&mut self, message: &[u8]) -> Result<(), NegativeReturn>;

    /// Advance internal timers to `clock_ms`. May emit segments.
    fn update(&mut self, clock_ms: u32);
}
