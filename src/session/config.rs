//! Session configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::core::ConfigError;
use crate::core::constants::{
    DEFAULT_CONVERSATION_ID, DEFAULT_PAYLOAD_SIZE, ECHO_PATTERN, MAINTENANCE_INTERVAL,
};
use crate::engine::EngineConfig;
use crate::transport::LossConfig;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Local address to bind.
    pub bind_addr: SocketAddr,

    /// Echo peer address.
    pub peer_addr: SocketAddr,

    /// Conversation id shared with the peer.
    pub conversation_id: u32,

    /// Echo payload length in bytes.
    pub payload_size: usize,

    /// Pattern repeated to fill the payload.
    pub payload_pattern: Vec<u8>,

    /// Maintenance tick cadence.
    pub tick_interval: Duration,

    /// Reliability engine tuning.
    pub engine: EngineConfig,

    /// Loss simulation, applied to both directions.
    pub loss: LossConfig,

    /// Stop by itself after this many round trips.
    pub max_round_trips: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            peer_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 9001)),
            conversation_id: DEFAULT_CONVERSATION_ID,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            payload_pattern: ECHO_PATTERN.to_vec(),
            tick_interval: MAINTENANCE_INTERVAL,
            engine: EngineConfig::default(),
            loss: LossConfig::default(),
            max_round_trips: None,
        }
    }
}

impl SessionConfig {
    /// Check the configuration before binding anything.
    ///
    /// A payload larger than the engine limit is allowed on purpose: the
    /// session then runs with a rejected first send and a stalled loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payload_size == 0 || self.payload_pattern.is_empty() {
            return Err(ConfigError::EmptyPayload);
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        self.loss.validate()?;
        self.engine.validate()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Bind all IPv4 interfaces on `port`.
    pub fn local_port(mut self, port: u16) -> Self {
        self.config.bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        self
    }

    /// Set the peer address.
    pub fn peer_addr(mut self, addr: SocketAddr) -> Self {
        self.config.peer_addr = addr;
        self
    }

    /// Set the conversation id.
    pub fn conversation_id(mut self, conv: u32) -> Self {
        self.config.conversation_id = conv;
        self
    }

    /// Set the echo payload length.
    pub fn payload_size(mut self, size: usize) -> Self {
        self.config.payload_size = size;
        self
    }

    /// Set the pattern used to fill the payload.
    pub fn payload_pattern(mut self, pattern: impl Into<Vec<u8>>) -> Self {
        self.config.payload_pattern = pattern.into();
        self
    }

    /// Set the maintenance tick cadence.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    /// Set the engine tuning.
    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.config.engine = engine;
        self
    }

    /// Set the loss simulation.
    pub fn loss(mut self, loss: LossConfig) -> Self {
        self.config.loss = loss;
        self
    }

    /// Stop after `count` round trips.
    pub fn max_round_trips(mut self, count: u64) -> Self {
        self.config.max_round_trips = Some(count);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
