//! Error types shared across the crate.

use thiserror::Error;

#[cfg(feature = "server")]
use crate::server::ServerError;
use crate::session::SessionError;
use crate::transport::TransportError;

/// Invalid configuration, detected before any socket is bound.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Echo payload must be at least one byte.
    #[error("payload size must be non-zero")]
    EmptyPayload,

    /// A percentage knob is outside `[0, 100]`.
    #[error("{name} must be within 0..=100, got {value}")]
    RatioOutOfRange {
        /// Name of the offending setting.
        name: &'static str,
        /// Value that was supplied.
        value: u32,
    },

    /// Maintenance interval must be positive.
    #[error("tick interval must be non-zero")]
    ZeroTickInterval,

    /// Peer idle timeout must be positive.
    #[error("peer idle timeout must be non-zero")]
    ZeroIdleTimeout,

    /// Engine parameters were rejected.
    #[error("engine configuration rejected: {0}")]
    Engine(String),
}

/// Top-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Echo server error.
    #[cfg(feature = "server")]
    #[error("server error: {0}")]
    Server(#[from] ServerError),
}
