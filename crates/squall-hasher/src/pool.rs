//! Bounded buffer pool for disk chunks.
//!
//! The pool caps pipeline memory: `capacity` buffers circulate between the
//! reader and the hash workers, and the reader blocks when all of them are
//! in flight. A [`PoolBuffer`] returns its allocation to the pool on drop
//! through a channel, so consumers just drop their [`Arc`] clones and the
//! last one recycles the buffer; no back-references are involved.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::ops::Deref;
use std::sync::Arc;

/// A fixed-capacity recycling pool of byte buffers.
pub struct BufferPool {
    home: Sender<Vec<u8>>,
    free: Receiver<Vec<u8>>,
}

impl BufferPool {
    /// A pool of `capacity` buffers (at least one), each pre-sized to
    /// `buffer_size` bytes.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let capacity = capacity.max(1);
        let (home, free) = bounded(capacity);
        for _ in 0..capacity {
            // cannot fail: the channel holds exactly `capacity` slots
            let _ = home.send(vec![0; buffer_size]);
        }
        Self { home, free }
    }

    /// Take a buffer, blocking while the pool is empty, and size it to
    /// `len` zero-extended.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        // the pool owns a sender, so the channel can never disconnect
        let mut buffer = self.free.recv().unwrap_or_default();
        buffer.resize(len, 0);
        buffer
    }

    /// Wrap a filled buffer for shared consumption. When the last clone is
    /// dropped the allocation comes back to this pool.
    pub fn share(&self, data: Vec<u8>) -> Arc<PoolBuffer> {
        Arc::new(PoolBuffer {
            data,
            home: self.home.clone(),
        })
    }

    /// Buffers currently waiting in the pool.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

/// An owned, shareable chunk buffer that recycles itself.
pub struct PoolBuffer {
    data: Vec<u8>,
    home: Sender<Vec<u8>>,
}

impl std::fmt::Debug for PoolBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PoolBuffer({} bytes)", self.data.len())
    }
}

impl Deref for PoolBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for PoolBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        // a full pool means the pool was rebuilt; let the allocator have it
        let _ = self.home.try_send(std::mem::take(&mut self.data));
    }
}
