//! KCP echo server.
//!
//! The other end of the benchmark: every message a peer delivers is sent back
//! verbatim on the same conversation. Peers are identified by address and get
//! their own engine on first contact; the conversation id is taken from the
//! first datagram.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::peer::PeerTable;
use crate::core::ConfigError;
use crate::core::constants::{
    DEFAULT_PEER_IDLE_TIMEOUT, DEFAULT_POOLED_BUFFERS, MAINTENANCE_INTERVAL, MAX_DATAGRAM_SIZE,
};
use crate::engine::{EngineConfig, KcpEngine, ReliabilityEngine};
use crate::session::{MaintenanceScheduler, SegmentOutput, SessionClock};
use crate::transport::{
    BufferPool, Direction, LossConfig, LossSimulator, PooledBuffer, Transport, TransportError,
    TransportSnapshot,
};

/// Errors that can occur in the echo server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,

    /// Engine tuning applied to every peer.
    pub engine: EngineConfig,

    /// Loss simulation on the server side.
    pub loss: LossConfig,

    /// Maintenance tick cadence.
    pub tick_interval: Duration,

    /// Maximum number of concurrent peers.
    pub max_peers: usize,

    /// Silence after which a peer's engine is dropped.
    pub peer_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9001)),
            engine: EngineConfig::default(),
            loss: LossConfig::default(),
            tick_interval: MAINTENANCE_INTERVAL,
            max_peers: 1024,
            peer_idle_timeout: DEFAULT_PEER_IDLE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Check the configuration before binding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.peer_idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        self.loss.validate()?;
        self.engine.validate()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct EchoServerBuilder {
    config: ServerConfig,
}

impl EchoServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
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

    /// Set the maintenance tick cadence.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    /// Set the maximum number of concurrent peers.
    pub fn max_peers(mut self, max: usize) -> Self {
        self.config.max_peers = max;
        self
    }

    /// Set how long a silent peer is kept.
    pub fn peer_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.peer_idle_timeout = timeout;
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for EchoServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for stopping a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
}

impl ServerHandle {
    /// Request a stop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Counters reported when the server stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    /// Peers known at shutdown.
    pub peers: usize,
    /// Messages echoed back.
    pub echoed: u64,
    /// Datagrams ignored (too short, or table full).
    pub ignored: u64,
    /// Peers dropped after going idle.
    pub evicted: u64,
    /// Maintenance ticks delivered.
    pub ticks: u64,
    /// Socket counters.
    pub transport: TransportSnapshot,
}

enum Event {
    Datagram(Result<(usize, SocketAddr), TransportError>),
    Tick(Option<u64>),
}

/// A KCP echo server.
///
/// # Example
///
/// ```ignore
/// use kcp_echo_bench::server::{EchoServer, EchoServerBuilder};
///
/// let config = EchoServerBuilder::new()
///     .bind_addr("0.0.0.0:9001".parse()?)
///     .build();
///
/// let server = EchoServer::bind(config).await?;
/// let handle = server.handle();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     handle.stop();
/// });
/// server.run().await?;
/// ```
pub struct EchoServer {
    config: ServerConfig,
    transport: Transport,
    peers: PeerTable,
    inbound_loss: LossSimulator,
    scheduler: MaintenanceScheduler,
    clock: SessionClock,
    recv_buf: PooledBuffer,
    message_buf: PooledBuffer,
    ignored: u64,
    shutdown: CancellationToken,
}

impl EchoServer {
    /// Bind to the configured address.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let transport = Transport::bind_with_shutdown(config.bind_addr, shutdown.clone()).await?;
        info!(local = %transport.local_addr()?, "echo server listening");

        Ok(Self {
            peers: PeerTable::new(config.max_peers),
            inbound_loss: LossSimulator::new(config.loss, Direction::Inbound),
            scheduler: MaintenanceScheduler::new(config.tick_interval, shutdown.clone()),
            clock: SessionClock::new(),
            recv_buf: BufferPool::new(MAX_DATAGRAM_SIZE, DEFAULT_POOLED_BUFFERS).acquire(),
            message_buf: BufferPool::new(config.engine.max_message_size, DEFAULT_POOLED_BUFFERS)
                .acquire(),
            ignored: 0,
            config,
            transport,
            shutdown,
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.transport.local_addr()
    }

    /// Handle for stopping the server.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until stopped.
    pub async fn run(mut self) -> Result<ServerStats, ServerError> {
        let result = self.serve().await;

        self.transport.stop();
        let stats = ServerStats {
            peers: self.peers.len(),
            echoed: self.peers.echoed(),
            ignored: self.ignored,
            evicted: self.peers.evicted(),
            ticks: self.scheduler.fired(),
            transport: self.transport.stats(),
        };
        info!(peers = stats.peers, echoed = stats.echoed, "echo server stopped");

        result.map(|()| stats)
    }

    async fn serve(&mut self) -> Result<(), ServerError> {
        match self.transport.writable().await {
            Err(TransportError::Closed) => return Ok(()),
            other => other?,
        }

        loop {
            let event = tokio::select! {
                received = self.transport.recv_from(&mut self.recv_buf) => Event::Datagram(received),
                fired = self.scheduler.tick() => Event::Tick(fired),
            };

            match event {
                Event::Datagram(Ok((len, from))) => {
                    if let Err(e) = self.on_datagram(len, from) {
                        return Err(ServerError::from(e));
                    }
                }
                Event::Datagram(Err(TransportError::Closed)) => return Ok(()),
                Event::Datagram(Err(e)) => {
                    error!(error = %e, "receive failed, stopping server");
                    return Err(ServerError::from(e));
                }
                Event::Tick(Some(_)) => self.on_tick(),
                Event::Tick(None) => return Ok(()),
            }
        }
    }

    fn on_datagram(&mut self, len: usize, from: SocketAddr) -> Result<(), ConfigError> {
        let Some(datagram) = self.inbound_loss.process(&self.recv_buf[..len]) else {
            return Ok(());
        };
        let Some(conv) = KcpEngine::<SegmentOutput>::conversation_of(&datagram) else {
            trace!(%from, len, "datagram too short for a conversation id");
            self.ignored += 1;
            return Ok(());
        };

        let now = Instant::now();
        let transport = &self.transport;
        let config = &self.config;
        let peer = self.peers.get_or_create(from, conv, &datagram, now, || {
            let output = SegmentOutput::new(
                transport.clone(),
                from,
                LossSimulator::new(config.loss, Direction::Outbound),
            );
            KcpEngine::new(conv, &config.engine, output)
        })?;
        let Some(peer) = peer else {
            warn!(%from, max = self.config.max_peers, "peer table full, datagram ignored");
            self.ignored += 1;
            return Ok(());
        };

        peer.engine.feed_inbound(&datagram);
        peer.observe(&datagram, now);
        while let Some(message) = peer.engine.pull_message(&mut self.message_buf) {
            match peer.engine.send_message(message) {
                Ok(()) => peer.echoed += 1,
                Err(e) => debug!(%from, error = %e, "echo rejected"),
            }
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        let clock = self.clock.engine_clock();
        for peer in self.peers.values_mut() {
            peer.engine.update(clock);
        }
        let evicted = self
            .peers
            .evict_idle(Instant::now(), self.config.peer_idle_timeout);
        if evicted > 0 {
            info!(evicted, remaining = self.peers.len(), "dropped idle peers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SegmentSink;

    /// Collects segments into a shared queue.
    #[derive(Clone, Default)]
    struct Capture(std::rc::Rc<std::cell::RefCell<Vec<Vec<u8>>>>);

    impl SegmentSink for Capture {
        fn emit(&mut self, segment: &[u8]) {
            self.0.borrow_mut().push(segment.to_vec());
        }
    }

    fn local_config() -> ServerConfig {
        EchoServerBuilder::new()
            .bind_addr("127.0.0.1:0".parse().unwrap())
            .build()
    }

    #[test]
    fn test_builder() {
        let config = EchoServerBuilder::new()
            .max_peers(2)
            .tick_interval(Duration::from_millis(10))
            .build();
        assert_eq!(config.max_peers, 2);
        assert_eq!(config.tick_interval, Duration::from_millis(10));
        assert_eq!(config.bind_addr.port(), 9001);
        assert_eq!(config.peer_idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_idle_timeout() {
        let config = EchoServerBuilder::new()
            .peer_idle_timeout(Duration::ZERO)
            .build();
        assert_eq!(config.validate(), Err(ConfigError::ZeroIdleTimeout));
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let config = EchoServerBuilder::new()
            .tick_interval(Duration::ZERO)
            .build();
        assert_eq!(config.validate(), Err(ConfigError::ZeroTickInterval));
    }

    #[tokio::test]
    async fn test_bind_and_stop() {
        let server = EchoServer::bind(local_config()).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let handle = server.handle();
        let run = tokio::spawn(server.run());
        handle.stop();

        let stats = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("server must stop")
            .unwrap()
            .unwrap();
        assert_eq!(stats.peers, 0);
    }

    #[tokio::test]
    async fn test_short_datagram_is_ignored() {
        let server = EchoServer::bind(local_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let run = tokio::spawn(server.run());

        let client = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        client.send_to(b"ab", addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();

        let stats = run.await.unwrap().unwrap();
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.peers, 0);
    }

    #[tokio::test]
    async fn test_echoes_kcp_message() {
        let server = EchoServer::bind(local_config()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let run = tokio::spawn(server.run());

        let socket = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let capture = Capture::default();
        let mut engine = KcpEngine::new(7, &EngineConfig::default(), capture.clone()).unwrap();
        engine.send_message(b"echo me").unwrap();

        let clock = SessionClock::new();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut message = vec![0u8; 1024];
        let mut echoed = None;

        for _ in 0..200 {
            engine.update(clock.engine_clock());
            for segment in capture.0.borrow_mut().drain(..) {
                socket.send_to(&segment, addr).await.unwrap();
            }
            if let Ok(Ok((len, _))) =
                tokio::time::timeout(Duration::from_millis(10), socket.recv_from(&mut buf)).await
            {
                engine.feed_inbound(&buf[..len]);
            }
            if let Some(received) = engine.pull_message(&mut message) {
                echoed = Some(received.to_vec());
                break;
            }
        }
        handle.stop();

        assert_eq!(echoed.as_deref(), Some(&b"echo me"[..]));
        let stats = run.await.unwrap().unwrap();
        assert_eq!(stats.peers, 1);
        assert_eq!(stats.echoed, 1);
    }

    #[tokio::test]
    async fn test_peer_table_limit() {
        let config = EchoServerBuilder::new()
            .bind_addr("127.0.0.1:0".parse().unwrap())
            .max_peers(1)
            .build();
        let server = EchoServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let run = tokio::spawn(server.run());

        // Any 4+ byte datagram names a conversation; the engine absorbs the rest.
        let first = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let second = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        first.send_to(&[1, 0, 0, 0, 0], addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        second.send_to(&[2, 0, 0, 0, 0], addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();

        let stats = run.await.unwrap().unwrap();
        assert_eq!(stats.peers, 1);
        assert_eq!(stats.ignored, 1);
    }
}
