//! # kcp-echo-bench
//!
//! Round-trip latency benchmark for a KCP reliability session over UDP.
//!
//! A client [`Session`] sends a fixed message, waits for the peer to echo it,
//! records the round trip and sends it again. The loop is self-clocking: one
//! send per valid echo. Every ten round trips an aggregate
//! [`LatencyReport`] is logged. Simulated loss can be applied to both
//! directions to watch the engine's retransmission at work.
//!
//! ## Feature Flags
//!
//! - `server` (default): the [`server::EchoServer`] echo peer
//!
//! ## Modules
//!
//! - [`core`]: constants and shared error types
//! - [`transport`]: UDP socket, buffer pool, loss simulation
//! - [`engine`]: the [`ReliabilityEngine`] interface and its KCP backend
//! - [`session`]: the benchmark client (harness, stats, scheduler, driver)
//! - [`server`]: the echo peer (requires `server` feature)
//!
//! ## Example Usage
//!
//! ```no_run
//! use kcp_echo_bench::prelude::*;
//!
//! # async fn example() -> Result<(), kcp_echo_bench::Error> {
//! let config = SessionConfigBuilder::new()
//!     .local_port(9000)
//!     .peer_addr("127.0.0.1:9001".parse().unwrap())
//!     .payload_size(16)
//!     .max_round_trips(100)
//!     .build();
//!
//! let session = Session::bind(config).await?;
//! let summary = session.run().await?;
//! for report in &summary.reports {
//!     println!("max={} avg10={} avg={}", report.max_ms, report.avg10_ms, report.avg_total_ms);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod engine;
pub mod session;
pub mod transport;

// Echo peer (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{ConfigError, Error};
    pub use crate::engine::{EngineConfig, KcpEngine, NegativeReturn, ReliabilityEngine, SegmentSink};
    pub use crate::session::{
        LatencyReport, Session, SessionConfig, SessionConfigBuilder, SessionError, SessionHandle,
        SessionState, SessionSummary,
    };
    pub use crate::transport::{LossConfig, Transport, TransportError};

    #[cfg(feature = "server")]
    pub use crate::server::{EchoServer, EchoServerBuilder, ServerConfig, ServerHandle};
}

// Re-export commonly used items at crate root
pub use crate::core::{ConfigError, Error};
pub use crate::engine::{KcpEngine, ReliabilityEngine};
pub use crate::session::{LatencyReport, Session, SessionConfig, SessionHandle, SessionSummary};
pub use crate::transport::{LossConfig, Transport, TransportError};
