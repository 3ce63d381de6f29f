//! Reliability engine tuning.

use crate::core::ConfigError;
use crate::core::constants::{
    DEFAULT_ENGINE_INTERVAL_MS, DEFAULT_FAST_RESEND, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MTU,
    DEFAULT_RECV_WINDOW, DEFAULT_SEND_WINDOW, KCP_HEADER_SIZE,
};

/// Smallest MTU the engine accepts.
const MIN_MTU: usize = 50;

/// Engine configuration.
///
/// The first four fields control retransmission aggressiveness; the defaults
/// are the "fast mode" used by the benchmark: no-delay on, 10 ms internal
/// interval, fast resend after 2 duplicate acks, congestion control off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Shorten the minimum RTO and skip delayed acks.
    pub no_delay: bool,
    /// Internal flush interval in milliseconds.
    pub interval_ms: u32,
    /// Duplicate-ack count that triggers fast retransmit (0 disables).
    pub fast_resend: u32,
    /// Whether congestion/flow control is enabled.
    pub flow_control: bool,
    /// Maximum transmission unit, header included.
    pub mtu: usize,
    /// Send window in segments.
    pub send_window: u16,
    /// Receive window in segments.
    pub recv_window: u16,
    /// Largest application message accepted by `send_message`.
    pub max_message_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            no_delay: true,
            interval_ms: DEFAULT_ENGINE_INTERVAL_MS,
            fast_resend: DEFAULT_FAST_RESEND,
            flow_control: false,
            mtu: DEFAULT_MTU,
            send_window: DEFAULT_SEND_WINDOW,
            recv_window: DEFAULT_RECV_WINDOW,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Conservative settings: delayed acks, 40 ms interval, no fast resend,
    /// congestion control on.
    pub fn normal() -> Self {
        Self {
            no_delay: false,
            interval_ms: 40,
            fast_resend: 0,
            flow_control: true,
            ..Self::default()
        }
    }

    /// Payload bytes carried by one full segment.
    pub fn segment_payload(&self) -> usize {
        self.mtu.saturating_sub(KCP_HEADER_SIZE)
    }

    /// Check that the engine can be built with these settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu < MIN_MTU {
            return Err(ConfigError::Engine(format!(
                "mtu {} below minimum {MIN_MTU}",
                self.mtu
            )));
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::Engine("interval_ms must be non-zero".into()));
        }
        if self.send_window == 0 || self.recv_window == 0 {
            return Err(ConfigError::Engine("windows must be non-zero".into()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Engine("max_message_size must be non-zero".into()));
        }

        // A message must fit into the receive window once fragmented.
        let fragments = self.max_message_size.div_ceil(self.segment_payload());
        if fragments >= usize::from(self.recv_window) {
            return Err(ConfigError::Engine(format!(
                "max_message_size {} needs {fragments} fragments, receive window is {}",
                self.max_message_size, self.recv_window
            )));
        }
        Ok(())
    }
}
