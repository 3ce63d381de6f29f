//! Per-peer engine table.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::core::ConfigError;
use crate::engine::{KcpEngine, ReliabilityEngine, segment_headers};
use crate::session::SegmentOutput;

/// One echo client as seen by the server.
pub(crate) struct Peer {
    pub(crate) engine: KcpEngine<SegmentOutput>,
    pub(crate) echoed: u64,
    last_seen: Instant,
    highest_sn: Option<u32>,
}

impl Peer {
    fn new(engine: KcpEngine<SegmentOutput>, now: Instant) -> Self {
        Self {
            engine,
            echoed: 0,
            last_seen: now,
            highest_sn: None,
        }
    }

    /// Record a datagram accepted from this peer.
    pub(crate) fn observe(&mut self, datagram: &[u8], now: Instant) {
        self.last_seen = now;
        let conv = self.engine.conversation_id();
        for header in segment_headers(datagram).filter(|h| h.conv == conv && h.is_push()) {
            self.highest_sn = Some(self.highest_sn.map_or(header.sn, |sn| sn.max(header.sn)));
        }
    }

    // A fresh client opens with sn 0 and has received nothing. Seeing that
    // after later sequence numbers means the client restarted on this address.
    fn is_restart(&self, datagram: &[u8]) -> bool {
        let conv = self.engine.conversation_id();
        self.highest_sn.is_some_and(|sn| sn > 0)
            && segment_headers(datagram)
                .any(|h| h.conv == conv && h.is_push() && h.sn == 0 && h.una == 0)
    }
}

/// Engines keyed by peer address, bounded by `max_peers`.
pub(crate) struct PeerTable {
    peers: HashMap<SocketAddr, Peer>,
    max_peers: usize,
    retired_echoed: u64,
    evicted: u64,
}

impl PeerTable {
    pub(crate) fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
            retired_echoed: 0,
            evicted: 0,
        }
    }

    /// Look up the peer at `addr`, creating its engine on first contact.
    ///
    /// A known address whose engine no longer matches the client (a new
    /// conversation id, or a restarted sequence) gets a fresh engine.
    /// Returns `None` when the table is full.
    pub(crate) fn get_or_create<F>(
        &mut self,
        addr: SocketAddr,
        conversation_id: u32,
        datagram: &[u8],
        now: Instant,
        make_engine: F,
    ) -> Result<Option<&mut Peer>, ConfigError>
    where
        F: FnOnce() -> Result<KcpEngine<SegmentOutput>, ConfigError>,
    {
        let full = self.peers.len() >= self.max_peers;
        match self.peers.entry(addr) {
            Entry::Occupied(entry) => {
                let peer = entry.into_mut();
                let stale = if peer.engine.conversation_id() != conversation_id {
                    debug!(%addr, conv = conversation_id, "conversation changed, resetting peer");
                    true
                } else if peer.is_restart(datagram) {
                    debug!(%addr, conv = conversation_id, "client restarted, resetting peer");
                    true
                } else {
                    false
                };
                if stale {
                    self.retired_echoed += peer.echoed;
                    *peer = Peer::new(make_engine()?, now);
                }
                Ok(Some(peer))
            }
            Entry::Vacant(_) if full => Ok(None),
            Entry::Vacant(entry) => {
                debug!(%addr, conv = conversation_id, "new peer");
                Ok(Some(entry.insert(Peer::new(make_engine()?, now))))
            }
        }
    }

    /// Drop peers that have been silent for `timeout`. Returns how many went.
    pub(crate) fn evict_idle(&mut self, now: Instant, timeout: Duration) -> usize {
        let before = self.peers.len();
        let mut retired = 0;
        self.peers.retain(|addr, peer| {
            let keep = now.saturating_duration_since(peer.last_seen) < timeout;
            if !keep {
                debug!(%addr, echoed = peer.echoed, "evicting idle peer");
                retired += peer.echoed;
            }
            keep
        });
        let evicted = before - self.peers.len();
        self.retired_echoed += retired;
        self.evicted += evicted as u64;
        evicted
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.values_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    /// Messages echoed by every engine this table has held.
    pub(crate) fn echoed(&self) -> u64 {
        self.retired_echoed + self.peers.values().map(|peer| peer.echoed).sum::<u64>()
    }

    pub(crate) fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::KCP_HEADER_SIZE;
    use crate::engine::{CMD_PUSH, EngineConfig};
    use crate::transport::{Direction, LossSimulator, Transport};

    const CONV: u32 = 123_456;

    /// A bare data segment header with an empty payload.
    fn push(conv: u32, sn: u32, una: u32) -> Vec<u8> {
        let mut header = vec![0u8; KCP_HEADER_SIZE];
        header[..4].copy_from_slice(&conv.to_le_bytes());
        header[4] = CMD_PUSH;
        header[12..16].copy_from_slice(&sn.to_le_bytes());
        header[16..20].copy_from_slice(&una.to_le_bytes());
        header
    }

    fn engine_for(
        transport: &Transport,
        addr: SocketAddr,
        conv: u32,
    ) -> impl FnOnce() -> Result<KcpEngine<SegmentOutput>, ConfigError> + '_ {
        move || {
            let loss = LossSimulator::passthrough(Direction::Outbound);
            let output = SegmentOutput::new(transport.clone(), addr, loss);
            KcpEngine::new(conv, &EngineConfig::default(), output)
        }
    }

    async fn setup() -> (Transport, SocketAddr) {
        let transport = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = "127.0.0.1:9000".parse().unwrap();
        (transport, addr)
    }

    /// Insert a peer at `addr` that has seen sequence numbers up to `sn`.
    fn seed_peer(
        table: &mut PeerTable,
        transport: &Transport,
        addr: SocketAddr,
        sn: u32,
        now: Instant,
    ) {
        let first = push(CONV, 0, 0);
        let peer = table
            .get_or_create(addr, CONV, &first, now, engine_for(transport, addr, CONV))
            .unwrap()
            .unwrap();
        peer.observe(&first, now);
        peer.observe(&push(CONV, sn, sn), now);
        peer.echoed = u64::from(sn) + 1;
    }

    #[tokio::test]
    async fn test_restarted_client_gets_fresh_engine() {
        let (transport, addr) = setup().await;
        let mut table = PeerTable::new(8);
        let now = Instant::now();
        seed_peer(&mut table, &transport, addr, 4, now);

        let restart = push(CONV, 0, 0);
        let peer = table
            .get_or_create(addr, CONV, &restart, now, engine_for(&transport, addr, CONV))
            .unwrap()
            .unwrap();
        assert_eq!(peer.echoed, 0);
        assert_eq!(peer.highest_sn, None);

        assert_eq!(table.len(), 1);
        assert_eq!(table.echoed(), 5);
    }

    #[tokio::test]
    async fn test_retransmission_keeps_engine() {
        let (transport, addr) = setup().await;
        let mut table = PeerTable::new(8);
        let now = Instant::now();
        seed_peer(&mut table, &transport, addr, 4, now);

        // Same sn 0, but the client has already received echoes.
        let resent = push(CONV, 0, 3);
        let peer = table
            .get_or_create(addr, CONV, &resent, now, engine_for(&transport, addr, CONV))
            .unwrap()
            .unwrap();
        assert_eq!(peer.echoed, 5);
        assert_eq!(peer.highest_sn, Some(4));
    }

    #[tokio::test]
    async fn test_first_segment_is_not_a_restart() {
        let (transport, addr) = setup().await;
        let mut table = PeerTable::new(8);
        let now = Instant::now();

        let first = push(CONV, 0, 0);
        for _ in 0..3 {
            let peer = table
                .get_or_create(addr, CONV, &first, now, engine_for(&transport, addr, CONV))
                .unwrap()
                .unwrap();
            peer.observe(&first, now);
            peer.echoed += 1;
        }
        assert_eq!(table.echoed(), 3);
    }

    #[tokio::test]
    async fn test_conversation_change_resets_peer() {
        let (transport, addr) = setup().await;
        let mut table = PeerTable::new(8);
        let now = Instant::now();
        seed_peer(&mut table, &transport, addr, 2, now);

        let other = push(CONV + 1, 7, 7);
        let peer = table
            .get_or_create(addr, CONV + 1, &other, now, engine_for(&transport, addr, CONV + 1))
            .unwrap()
            .unwrap();
        assert_eq!(peer.engine.conversation_id(), CONV + 1);
        assert_eq!(peer.echoed, 0);
    }

    #[tokio::test]
    async fn test_idle_peers_are_evicted() {
        let (transport, _) = setup().await;
        let mut table = PeerTable::new(2);
        let start = Instant::now();
        let quiet: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        let busy: SocketAddr = "127.0.0.1:9002".parse().unwrap();
        let late: SocketAddr = "127.0.0.1:9003".parse().unwrap();

        seed_peer(&mut table, &transport, quiet, 1, start);
        seed_peer(&mut table, &transport, busy, 1, start + Duration::from_secs(20));

        let first = push(CONV, 0, 0);
        let full = table
            .get_or_create(late, CONV, &first, start, engine_for(&transport, late, CONV))
            .unwrap();
        assert!(full.is_none());

        let evicted = table.evict_idle(start + Duration::from_secs(40), Duration::from_secs(30));
        assert_eq!(evicted, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.evicted(), 1);
        assert_eq!(table.echoed(), 4);

        let admitted = table
            .get_or_create(late, CONV, &first, start, engine_for(&transport, late, CONV))
            .unwrap();
        assert!(admitted.is_some());
    }
}
