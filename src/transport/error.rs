//! Transport layer error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The local port could not be claimed. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The transport was stopped. Expected during shutdown.
    #[error("transport closed")]
    Closed,

    /// Any other socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether this error is the expected result of a shutdown rather than
    /// a genuine I/O failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether a non-blocking send failed only because the socket buffer was
    /// full.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::WouldBlock)
    }
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
