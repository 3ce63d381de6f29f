//! Reusable, bounded pool of fixed-size byte buffers.
//!
//! Receive and reassembly buffers are sized to the largest datagram or message
//! the session can see. Allocating them on every receive would be wasteful, so
//! sessions check one out of a [`BufferPool`] and hand it back on drop.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug)]
struct PoolInner {
    buffer_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<Vec<u8>>>,
}

/// Pool of zero-initialized buffers of one fixed size.
///
/// At most `max_idle` returned buffers are retained; extras are freed.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool handing out buffers of `buffer_size` bytes.
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                max_idle,
                idle: Mutex::new(Vec::with_capacity(max_idle)),
            }),
        }
    }

    /// Size of every buffer in this pool.
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of idle buffers ready for reuse.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Check out a buffer, reusing an idle one when available.
    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .inner
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.buffer_size]);
        PooledBuffer {
            buf,
            pool: Arc::clone(&self.inner),
        }
    }
}

/// A buffer checked out of a [`BufferPool`]. Returns itself on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut idle = self.pool.idle.lock();
        if idle.len() < self.pool.max_idle {
            idle.push(std::mem::take(&mut self.buf));
        }
    }
}
