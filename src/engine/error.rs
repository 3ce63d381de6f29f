//! Engine error types.

use thiserror::Error;

/// A message the engine refused to queue.
///
/// Callers treat this as message loss. It is never a transient condition worth
/// retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegativeReturn {
    /// Zero-length messages cannot be framed.
    #[error("empty message")]
    Empty,

    /// Message exceeds the configured maximum.
    #[error("message of {len} bytes exceeds the {max} byte limit")]
    Oversized {
        /// Message length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// The engine's send queue refused the message.
    #[error("send queue unavailable: {0}")]
    QueueUnavailable(String),
}
