//! Echo peer for the benchmark.
//!
//! Runs one KCP engine per remote address and sends every delivered message
//! straight back.

mod peer;
#[allow(clippy::module_inception)]
mod server;

pub use server::{EchoServer, EchoServerBuilder, ServerConfig, ServerError, ServerHandle, ServerStats};
