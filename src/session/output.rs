//! Output callback: engine segments to the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{trace, warn};

use crate::engine::SegmentSink;
use crate::transport::{LossSimulator, Transport};

/// Counters for the outbound direction.
#[derive(Debug, Default)]
pub struct OutputCounters {
    emitted: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl OutputCounters {
    /// Segments produced by the engine.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Segments dropped by the loss simulator.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Segments the socket refused.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// [`SegmentSink`] that sends each segment to one fixed peer.
///
/// This is the explicit context the engine's output callback runs against:
/// it carries the session's own transport, peer and loss simulator.
#[derive(Debug)]
pub struct SegmentOutput {
    transport: Transport,
    peer: SocketAddr,
    loss: LossSimulator,
    counters: Arc<OutputCounters>,
}

impl SegmentOutput {
    /// Create an output bound to `peer`.
    pub fn new(transport: Transport, peer: SocketAddr, loss: LossSimulator) -> Self {
        Self {
            transport,
            peer,
            loss,
            counters: Arc::new(OutputCounters::default()),
        }
    }

    /// Shared handle to this output's counters.
    pub fn counters(&self) -> Arc<OutputCounters> {
        Arc::clone(&self.counters)
    }

    /// Destination address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl SegmentSink for SegmentOutput {
    fn emit(&mut self, segment: &[u8]) {
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);

        let Some(datagram) = self.loss.process(segment) else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        // Best effort: never retried, never blocks. Before the socket's first
        // readiness event this fails with WouldBlock and counts as failed.
        match self.transport.try_send_to(&datagram, self.peer) {
            Ok(_) => {}
            Err(e) if e.is_closed() => {
                trace!(peer = %self.peer, "segment discarded after stop");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(peer = %self.peer, error = %e, len = datagram.len(), "segment send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Direction, LossConfig};

    async fn pair() -> (Transport, Transport) {
        let a = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn test_emit_sends_to_peer() {
        let (local, remote) = pair().await;
        let mut output = SegmentOutput::new(
            local.clone(),
            remote.local_addr().unwrap(),
            LossSimulator::passthrough(Direction::Outbound),
        );
        local.writable().await.unwrap();

        output.emit(b"segment");

        let mut buf = vec![0u8; 64];
        let datagram = remote.recv(&mut buf).await.unwrap();
        assert_eq!(datagram.payload, b"segment");
        assert_eq!(datagram.from, local.local_addr().unwrap());
        assert_eq!(output.counters().emitted(), 1);
    }

    #[tokio::test]
    async fn test_emit_respects_loss() {
        let (local, remote) = pair().await;
        let loss = LossSimulator::new(
            LossConfig {
                loss_ratio: 100,
                damage_ratio: 0,
                seed: Some(1),
            },
            Direction::Outbound,
        );
        let mut output = SegmentOutput::new(local.clone(), remote.local_addr().unwrap(), loss);

        output.emit(b"lost");
        output.emit(b"lost");

        let counters = output.counters();
        assert_eq!(counters.emitted(), 2);
        assert_eq!(counters.dropped(), 2);
        assert_eq!(local.stats().datagrams_sent, 0);
    }

    #[tokio::test]
    async fn test_emit_after_stop_is_silent() {
        let (local, remote) = pair().await;
        let mut output = SegmentOutput::new(
            local.clone(),
            remote.local_addr().unwrap(),
            LossSimulator::passthrough(Direction::Outbound),
        );
        local.stop();

        output.emit(b"late");
        assert_eq!(output.counters().failed(), 0);
        assert_eq!(local.stats().datagrams_sent, 0);
    }
}
