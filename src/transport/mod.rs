//! Datagram transport layer.
//!
//! Everything that touches the UDP socket lives here:
//!
//! - **Socket**: [`Transport`], a cancellable tokio UDP endpoint
//! - **Buffers**: [`BufferPool`], reusable receive/reassembly buffers
//! - **Loss simulation**: [`LossSimulator`], drop/damage for stress runs
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Echo harness                 │
//! ├─────────────────────────────────────────┤
//! │       Reliability engine (KCP)          │
//! ├─────────────────────────────────────────┤
//! │   Loss simulator  →  Transport          │  ← This module
//! ├─────────────────────────────────────────┤
//! │              UDP                        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Datagrams crossing this layer are opaque byte buffers; the wire format
//! belongs to the engine.

mod error;
mod loss;
mod pool;
mod socket;

pub use error::{TransportError, TransportResult};
pub use loss::{Direction, LossConfig, LossSimulator};
pub use pool::{BufferPool, PooledBuffer};
pub use socket::{InboundDatagram, Transport, TransportSnapshot, TransportStats};
