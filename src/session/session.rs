//! Session driver.
//!
//! One task multiplexes two event sources with `tokio::select!`: datagram
//! arrival and the maintenance tick. Each handler runs to completion before
//! the next event is polled, so every call into the engine (`feed_inbound`,
//! `pull_message`, `send_message`, `update`) is serialized without locks.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::clock::SessionClock;
use super::config::SessionConfig;
use super::harness::{EchoHarness, EchoMessage, EchoOutcome};
use super::output::{OutputCounters, SegmentOutput};
use super::scheduler::MaintenanceScheduler;
use super::stats::LatencyReport;
use crate::core::ConfigError;
use crate::core::constants::{DEFAULT_POOLED_BUFFERS, MAX_DATAGRAM_SIZE};
use crate::engine::{EngineConfig, KcpEngine, ReliabilityEngine};
use crate::transport::{
    BufferPool, Direction, InboundDatagram, LossSimulator, PooledBuffer, Transport,
    TransportError, TransportSnapshot,
};

/// Errors that can occur in a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure (bind, or a fatal receive error).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// `start` was called on a session that already left `Created`.
    #[error("session already started")]
    AlreadyStarted,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Bound, nothing sent yet.
    Created,
    /// Echo loop running.
    Running,
    /// Stop observed; draining.
    Stopping,
    /// Terminal.
    Stopped,
}

/// Cloneable handle used to stop a running session from another task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Request a stop.
    ///
    /// Cancels the pending receive and sets the stopped flag; the run loop
    /// then exits without re-arming either event source.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// What a finished session observed.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Completed round trips.
    pub round_trips: u64,
    /// Timestamp history, `samples[0]` being the initial send.
    pub samples: Vec<u64>,
    /// Aggregate reports, one per ten round trips.
    pub reports: Vec<LatencyReport>,
    /// Echo sends the engine accepted.
    pub sends: u64,
    /// Echoes discarded for not matching.
    pub mismatches: u64,
    /// Sends rejected by the engine.
    pub rejected_sends: u64,
    /// Inbound datagrams dropped by the loss simulator.
    pub inbound_dropped: u64,
    /// Outbound segments dropped by the loss simulator.
    pub outbound_dropped: u64,
    /// Maintenance ticks delivered.
    pub ticks: u64,
    /// Socket counters.
    pub transport: TransportSnapshot,
}

enum Event {
    Datagram(Result<(usize, SocketAddr), TransportError>),
    Tick(Option<u64>),
}

/// A benchmark session: one socket, one peer, one engine.
pub struct Session<E: ReliabilityEngine = KcpEngine<SegmentOutput>> {
    config: SessionConfig,
    state: SessionState,
    transport: Transport,
    engine: E,
    harness: EchoHarness,
    scheduler: MaintenanceScheduler,
    inbound_loss: LossSimulator,
    output: Arc<OutputCounters>,
    clock: SessionClock,
    recv_buf: PooledBuffer,
    message_buf: PooledBuffer,
    shutdown: CancellationToken,
}

impl Session<KcpEngine<SegmentOutput>> {
    /// Bind a session backed by a KCP engine.
    pub async fn bind(config: SessionConfig) -> Result<Self, SessionError> {
        Self::bind_with(config, KcpEngine::new).await
    }
}

impl<E: ReliabilityEngine> Session<E> {
    /// Bind a session whose engine is built by `make_engine`.
    ///
    /// `make_engine` receives the conversation id, the engine configuration
    /// and the output sink the engine must emit segments into.
    pub async fn bind_with<F>(config: SessionConfig, make_engine: F) -> Result<Self, SessionError>
    where
        F: FnOnce(u32, &EngineConfig, SegmentOutput) -> Result<E, ConfigError>,
    {
        config.validate()?;

        let shutdown = CancellationToken::new();
        let transport = Transport::bind_with_shutdown(config.bind_addr, shutdown.clone()).await?;

        let output = SegmentOutput::new(
            transport.clone(),
            config.peer_addr,
            LossSimulator::new(config.loss, Direction::Outbound),
        );
        let output_counters = output.counters();
        let engine = make_engine(config.conversation_id, &config.engine, output)?;

        let recv_buf = BufferPool::new(MAX_DATAGRAM_SIZE, DEFAULT_POOLED_BUFFERS).acquire();
        let message_buf =
            BufferPool::new(config.engine.max_message_size, DEFAULT_POOLED_BUFFERS).acquire();

        let message = EchoMessage::repeating(&config.payload_pattern, config.payload_size);

        info!(
            local = %transport.local_addr()?,
            peer = %config.peer_addr,
            conv = config.conversation_id,
            payload = config.payload_size,
            "session bound"
        );

        Ok(Self {
            scheduler: MaintenanceScheduler::new(config.tick_interval, shutdown.clone()),
            inbound_loss: LossSimulator::new(config.loss, Direction::Inbound),
            harness: EchoHarness::new(message),
            output: output_counters,
            clock: SessionClock::new(),
            state: SessionState::Created,
            config,
            transport,
            engine,
            recv_buf,
            message_buf,
            shutdown,
        })
    }

    /// Handle for stopping the session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.transport.local_addr()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The echo harness.
    pub fn harness(&self) -> &EchoHarness {
        &self.harness
    }

    /// Issue the first echo send. `Created → Running`.
    ///
    /// A rejected first send is logged and leaves the loop stalled; it is not
    /// an error.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Created {
            return Err(SessionError::AlreadyStarted);
        }

        let now = self.clock.now_ms();
        if self.harness.start(&mut self.engine, now).is_err() {
            warn!("initial echo send rejected; no round trips will complete");
        }
        self.state = SessionState::Running;
        debug!("session running");
        Ok(())
    }

    /// Run the session until it is stopped.
    ///
    /// Starts the echo loop first if [`start`](Self::start) was not called.
    /// Returns when a stop is requested, when `max_round_trips` is reached,
    /// or with an error when the socket fails.
    pub async fn run(mut self) -> Result<SessionSummary, SessionError> {
        if self.state == SessionState::Created {
            self.start()?;
        }

        let result = self.drive().await;

        self.state = SessionState::Stopping;
        self.transport.stop();
        debug!("session stopping");

        let summary = self.summary();
        self.state = SessionState::Stopped;
        info!(
            round_trips = summary.round_trips,
            mismatches = summary.mismatches,
            rejected = summary.rejected_sends,
            "session stopped"
        );

        result.map(|()| summary).map_err(SessionError::from)
    }

    // The first tick flushes the initial send through a non-blocking write,
    // so the socket must be writable before the loop starts.
    async fn drive(&mut self) -> Result<(), TransportError> {
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
                Event::Datagram(Ok((len, from))) => self.on_datagram(len, from),
                Event::Datagram(Err(TransportError::Closed)) => return Ok(()),
                Event::Datagram(Err(e)) => {
                    error!(error = %e, "receive failed, stopping session");
                    return Err(e);
                }
                Event::Tick(Some(_)) => self.on_tick(),
                Event::Tick(None) => return Ok(()),
            }

            if self.limit_reached() {
                info!(round_trips = self.harness.round_trips(), "round-trip limit reached");
                self.shutdown.cancel();
            }
        }
    }

    fn on_datagram(&mut self, len: usize, from: SocketAddr) {
        let datagram = InboundDatagram {
            payload: &self.recv_buf[..len],
            from,
        };
        trace!(from = %datagram.from, len = datagram.len(), "datagram received");

        let Some(delivered) = self.inbound_loss.process(datagram.payload) else {
            return;
        };
        self.engine.feed_inbound(&delivered);

        while let Some(message) = self.engine.pull_message(&mut self.message_buf) {
            let now = self.clock.now_ms();
            let outcome = self.harness.on_message(message, &mut self.engine, now);
            log_outcome(&outcome);
        }
    }

    fn on_tick(&mut self) {
        self.engine.update(self.clock.engine_clock());
    }

    fn limit_reached(&self) -> bool {
        self.config
            .max_round_trips
            .is_some_and(|max| self.harness.round_trips() >= max)
    }

    fn summary(&self) -> SessionSummary {
        let stats = self.harness.stats();
        SessionSummary {
            round_trips: stats.round_trips(),
            samples: stats.samples().to_vec(),
            reports: stats.reports().to_vec(),
            sends: self.harness.sends(),
            mismatches: self.harness.mismatches(),
            rejected_sends: self.harness.rejected_sends(),
            inbound_dropped: self.inbound_loss.dropped(),
            outbound_dropped: self.output.dropped(),
            ticks: self.scheduler.fired(),
            transport: self.transport.stats(),
        }
    }
}

fn log_outcome(outcome: &EchoOutcome) {
    match outcome {
        EchoOutcome::RoundTrip { round_trip, .. } => {
            info!(
                round_trip = round_trip.index,
                interval_ms = round_trip.interval_ms,
                "echo"
            );
            if let Some(report) = &round_trip.report {
                info!(
                    round_trips = report.round_trips,
                    max_ms = report.max_ms,
                    avg10_ms = report.avg10_ms,
                    avg_total_ms = report.avg_total_ms,
                    "latency report"
                );
            }
        }
        EchoOutcome::Mismatch { len } => {
            warn!(len, "echo content mismatch; loop stalled");
        }
        EchoOutcome::Unexpected => {
            debug!("message received before start; discarded");
        }
    }
}
