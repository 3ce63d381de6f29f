//! Benchmark constants.
//!
//! Defaults that mirror the reference echo benchmark. Everything here can be
//! overridden through [`SessionConfig`](crate::session::SessionConfig) or
//! [`EngineConfig`](crate::engine::EngineConfig).

use std::time::Duration;

// =============================================================================
// TRANSPORT
// =============================================================================

/// Largest datagram the transport will ever read in one receive.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Number of idle buffers a pool keeps around for reuse.
pub const DEFAULT_POOLED_BUFFERS: usize = 4;

// =============================================================================
// RELIABILITY ENGINE
// =============================================================================

/// Conversation id used by the benchmark client.
pub const DEFAULT_CONVERSATION_ID: u32 = 123_456;

/// Engine-internal flush interval in milliseconds.
pub const DEFAULT_ENGINE_INTERVAL_MS: u32 = 10;

/// Duplicate-ack count that triggers a fast retransmit.
pub const DEFAULT_FAST_RESEND: u32 = 2;

/// Default engine MTU in bytes.
pub const DEFAULT_MTU: usize = 1400;

/// Default send window, in segments.
pub const DEFAULT_SEND_WINDOW: u16 = 128;

/// Default receive window, in segments.
pub const DEFAULT_RECV_WINDOW: u16 = 128;

/// Largest application message the engine adapter accepts.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Size of the KCP segment header (conv, cmd, frg, wnd, ts, sn, una, len).
pub const KCP_HEADER_SIZE: usize = 24;

// =============================================================================
// SCHEDULING
// =============================================================================

/// Cadence of the maintenance tick that drives `update`.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_millis(5);

/// How long the echo server keeps a silent peer's engine.
pub const DEFAULT_PEER_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// ECHO TEST
// =============================================================================

/// Pattern repeated to build the echo payload.
pub const ECHO_PATTERN: &[u8] = b"haha";

/// Default echo payload length in bytes.
pub const DEFAULT_PAYLOAD_SIZE: usize = 16;

/// Number of round trips per aggregate latency report.
pub const REPORT_EVERY: usize = 10;

// =============================================================================
// LOSS SIMULATION
// =============================================================================

/// Upper bound (exclusive draw range) for loss and damage ratios.
pub const RATIO_SCALE: u32 = 100;
