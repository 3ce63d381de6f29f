//! Echo benchmark session.
//!
//! A [`Session`] owns one UDP [`Transport`](crate::transport::Transport), one
//! reliability engine and one [`EchoHarness`]. It is driven by a single task
//! that waits on two event sources:
//!
//! - **Datagram arrival**: fed through inbound loss into the engine, then every
//!   ready message is handed to the harness
//! - **Maintenance tick**: advances the engine clock every 5 ms
//!
//! ```text
//!   Created ──start──▶ Running ──stop──▶ Stopping ──▶ Stopped
//! ```

mod clock;
mod config;
mod harness;
mod output;
mod scheduler;
#[allow(clippy::module_inception)]
mod session;
mod stats;

pub use clock::SessionClock;
pub use config::{SessionConfig, SessionConfigBuilder};
pub use harness::{EchoHarness, EchoMessage, EchoOutcome, HarnessState};
pub use output::{OutputCounters, SegmentOutput};
pub use scheduler::MaintenanceScheduler;
pub use session::{Session, SessionError, SessionHandle, SessionState, SessionSummary};
pub use stats::{LatencyReport, LatencyStats, RoundTrip};
