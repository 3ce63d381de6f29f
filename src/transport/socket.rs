//! Async UDP transport for the benchmark.
//!
//! Wraps a tokio [`UdpSocket`] with a cancellation token so that a pending
//! receive can be interrupted by [`Transport::stop`]. Cancellation surfaces as
//! [`TransportError::Closed`], never as a generic I/O error.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::error::{TransportError, TransportResult};

/// A received datagram, borrowed from the caller's receive buffer.
///
/// Only valid for the duration of one receive handler invocation.
#[derive(Debug, Clone, Copy)]
pub struct InboundDatagram<'a> {
    /// Raw payload bytes.
    pub payload: &'a [u8],
    /// Sender address.
    pub from: SocketAddr,
}

impl InboundDatagram<'_> {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Datagram counters for one transport.
#[derive(Debug, Default)]
pub struct TransportStats {
    datagrams_sent: AtomicU64,
    bytes_sent: AtomicU64,
    datagrams_received: AtomicU64,
    bytes_received: AtomicU64,
    send_failures: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportSnapshot {
    /// Datagrams handed to the socket.
    pub datagrams_sent: u64,
    /// Bytes handed to the socket.
    pub bytes_sent: u64,
    /// Datagrams read from the socket.
    pub datagrams_received: u64,
    /// Bytes read from the socket.
    pub bytes_received: u64,
    /// Sends that the socket refused.
    pub send_failures: u64,
}

impl TransportStats {
    fn on_send(&self, len: usize) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn on_recv(&self, len: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn on_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters.
    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Bound UDP endpoint with cooperative shutdown.
///
/// Cloning is cheap; all clones share the socket, the shutdown token and the
/// counters. The socket itself is released when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Transport {
    /// The underlying UDP socket.
    socket: Arc<UdpSocket>,
    /// Cancelled by [`Transport::stop`].
    shutdown: CancellationToken,
    /// Shared counters.
    stats: Arc<TransportStats>,
}

impl Transport {
    /// Bind a new transport to `addr`.
    pub async fn bind(addr: SocketAddr) -> TransportResult<Self> {
        Self::bind_with_shutdown(addr, CancellationToken::new()).await
    }

    /// Bind a new transport that stops when `shutdown` is cancelled.
    pub async fn bind_with_shutdown(
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> TransportResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self::from_socket(socket, shutdown))
    }

    /// Wrap an already bound socket.
    pub fn from_socket(socket: UdpSocket, shutdown: CancellationToken) -> Self {
        Self {
            socket: Arc::new(socket),
            shutdown,
            stats: Arc::new(TransportStats::default()),
        }
    }

    /// Get the local address.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.ensure_open()?;
        Ok(self.socket.local_addr()?)
    }

    /// Wait for the next datagram and copy it into `buf`.
    ///
    /// Returns the number of bytes written and the sender. Suspends until a
    /// datagram arrives or the transport is stopped. This method is cancel
    /// safe and may be used as a `tokio::select!` branch.
    pub async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        self.ensure_open()?;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(TransportError::Closed),
            result = self.socket.recv_from(buf) => {
                let (len, from) = result?;
                self.stats.on_recv(len);
                Ok((len, from))
            }
        }
    }

    /// Like [`recv_from`](Self::recv_from), returning a borrowed datagram.
    pub async fn recv<'a>(&self, buf: &'a mut [u8]) -> TransportResult<InboundDatagram<'a>> {
        let (len, from) = self.recv_from(buf).await?;
        let buf: &'a [u8] = buf;
        Ok(InboundDatagram {
            payload: &buf[..len],
            from,
        })
    }

    /// Send one datagram to `peer`.
    pub async fn send_to(&self, data: &[u8], peer: SocketAddr) -> TransportResult<usize> {
        self.ensure_open()?;
        match self.socket.send_to(data, peer).await {
            Ok(sent) => {
                self.stats.on_send(sent);
                Ok(sent)
            }
            Err(e) => {
                self.stats.on_send_failure();
                Err(e.into())
            }
        }
    }

    /// Wait until the socket can accept a datagram.
    ///
    /// A freshly bound socket is not writable until the runtime has polled it
    /// once; call this before relying on [`try_send_to`](Self::try_send_to).
    /// Resolves with [`TransportError::Closed`] if the transport is stopped
    /// first. Cancel safe.
    pub async fn writable(&self) -> TransportResult<()> {
        self.ensure_open()?;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(TransportError::Closed),
            result = self.socket.writable() => Ok(result?),
        }
    }

    /// Send one datagram without waiting for socket readiness.
    ///
    /// A full socket buffer yields a `WouldBlock` I/O error; the datagram is
    /// not queued. The same happens before the runtime has first polled the
    /// socket, so a datagram sent right after binding is lost unless
    /// [`writable`](Self::writable) was awaited.
    pub fn try_send_to(&self, data: &[u8], peer: SocketAddr) -> TransportResult<usize> {
        self.ensure_open()?;
        match self.socket.try_send_to(data, peer) {
            Ok(sent) => {
                self.stats.on_send(sent);
                Ok(sent)
            }
            Err(e) => {
                self.stats.on_send_failure();
                Err(e.into())
            }
        }
    }

    /// Stop the transport.
    ///
    /// Any pending receive completes with [`TransportError::Closed`] and all
    /// later operations fail the same way.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The token that stops this transport.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Datagram counters.
    pub fn stats(&self) -> TransportSnapshot {
        self.stats.snapshot()
    }

    fn ensure_open(&self) -> TransportResult<()> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}
