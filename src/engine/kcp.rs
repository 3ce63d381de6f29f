//! KCP-backed reliability engine.

use std::io::{self, Write};

use ::kcp::Kcp;
use tracing::{debug, trace, warn};

use super::{EngineConfig, NegativeReturn, ReliabilityEngine, SegmentSink};
use crate::core::ConfigError;
use crate::core::constants::KCP_HEADER_SIZE;

/// Command byte of a data segment.
pub const CMD_PUSH: u8 = 81;

/// Header fields of one KCP segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Conversation id.
    pub conv: u32,
    /// Command byte.
    pub cmd: u8,
    /// Sequence number.
    pub sn: u32,
    /// Next sequence number the sender expects to receive.
    pub una: u32,
    /// Payload length.
    pub len: u32,
}

impl SegmentHeader {
    /// Whether this segment carries data.
    pub fn is_push(&self) -> bool {
        self.cmd == CMD_PUSH
    }
}

/// Iterate over the segment headers packed into one datagram.
///
/// Stops at the first truncated segment.
pub fn segment_headers(datagram: &[u8]) -> impl Iterator<Item = SegmentHeader> + '_ {
    let mut rest = datagram;
    std::iter::from_fn(move || {
        let header = rest.get(..KCP_HEADER_SIZE)?;
        let word = |at: usize| {
            u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
        };
        let parsed = SegmentHeader {
            conv: word(0),
            cmd: header[4],
            sn: word(12),
            una: word(16),
            len: word(20),
        };
        let end = KCP_HEADER_SIZE.checked_add(parsed.len as usize)?;
        rest = rest.get(end..)?;
        Some(parsed)
    })
}

/// Adapts a [`SegmentSink`] to the `Write` output expected by `kcp`.
///
/// Every `write` is one complete segment batch, i.e. one datagram.
struct SinkWriter<S>(S);

impl<S: SegmentSink> Write for SinkWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.emit(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// [`ReliabilityEngine`] over a KCP control block.
pub struct KcpEngine<S: SegmentSink> {
    kcp: Kcp<SinkWriter<S>>,
    conversation_id: u32,
    max_message_size: usize,
}

impl<S: SegmentSink> KcpEngine<S> {
    /// Create an engine for `conversation_id` that emits segments into `sink`.
    pub fn new(conversation_id: u32, config: &EngineConfig, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut kcp = Kcp::new(conversation_id, SinkWriter(sink));
        kcp.set_nodelay(
            config.no_delay,
            config.interval_ms as i32,
            config.fast_resend as i32,
            !config.flow_control,
        );
        kcp.set_wndsize(config.send_window, config.recv_window);
        kcp.set_mtu(config.mtu)
            .map_err(|e| ConfigError::Engine(format!("{e:?}")))?;

        Ok(Self {
            kcp,
            conversation_id,
            max_message_size: config.max_message_size,
        })
    }

    /// Read the conversation id from a datagram header.
    ///
    /// Returns `None` if the datagram is too short to carry one.
    pub fn conversation_of(datagram: &[u8]) -> Option<u32> {
        let conv: [u8; 4] = datagram.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(conv))
    }

    /// Largest message `send_message` accepts.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl<S: SegmentSink> ReliabilityEngine for KcpEngine<S> {
    fn conversation_id(&self) -> u32 {
        self.conversation_id
    }

    fn feed_inbound(&mut self, datagram: &[u8]) {
        if let Err(e) = self.kcp.input(datagram) {
            trace!(error = ?e, len = datagram.len(), "engine absorbed malformed datagram");
        }
    }

    fn pull_message<'a>(&mut self, buf: &'a mut [u8]) -> Option<&'a [u8]> {
        // Nothing ready, or the head message is still missing fragments.
        let size = self.kcp.peeksize().ok()?;

        if size > buf.len() {
            // The head message would block the queue forever; discard it.
            warn!(size, capacity = buf.len(), "discarding message larger than receive buffer");
            let mut scratch = vec![0u8; size];
            if let Err(e) = self.kcp.recv(&mut scratch) {
                debug!(error = ?e, size, "failed to discard oversized message");
            }
            return None;
        }

        let len = match self.kcp.recv(buf) {
            Ok(len) => len,
            Err(e) => {
                debug!(error = ?e, "engine recv failed");
                return None;
            }
        };
        let buf: &'a [u8] = buf;
        Some(&buf[..len])
    }

    fn send_message(&mut self, message: &[u8]) -> Result<(), NegativeReturn> {
        if message.is_empty() {
            return Err(NegativeReturn::Empty);
        }
        if message.len() > self.max_message_size {
            return Err(NegativeReturn::Oversized {
                len: message.len(),
                max: self.max_message_size,
            });
        }

        self.kcp
            .send(message)
            .map(|_| ())
            .map_err(|e| NegativeReturn::QueueUnavailable(format!("{e:?}")))
    }

    fn update(&mut self, clock_ms: u32) {
        if let Err(e) = self.kcp.update(clock_ms) {
            debug!(error = ?e, "engine update failed");
        }
    }
}
