//! Scratch buffer pool
//!
//! Every outbound swap serializes its payload before hitting the wire.
//! Pooling the scratch buffers keeps that off the allocator on the hot
//! request/response path. Buffers return to the pool when the guard
//! drops, so release happens on every exit path.

use object_pool::{Pool, ReusableOwned};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

const DEFAULT_BUFFERS: usize = 32;
const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// A pool of reusable encode buffers.
#[derive(Clone)]
pub struct BufferPool {
    pool: Arc<Pool<Vec<u8>>>,
    buffer_capacity: usize,
}

impl BufferPool {
    pub fn new(buffers: usize, buffer_capacity: usize) -> Self {
        Self {
            pool: Arc::new(Pool::new(buffers, move || {
                Vec::with_capacity(buffer_capacity)
            })),
            buffer_capacity,
        }
    }

    /// Take an empty buffer out of the pool, growing the pool if every
    /// buffer is in use.
    pub fn acquire(&self) -> ScratchBuf {
        let capacity = self.buffer_capacity;
        let mut buf = self.pool.pull_owned(move || Vec::with_capacity(capacity));
        buf.clear();
        ScratchBuf(buf)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFERS, DEFAULT_BUFFER_CAPACITY)
    }
}

/// A pooled buffer; returns to its pool on drop.
pub struct ScratchBuf(ReusableOwned<Vec<u8>>);

impl Deref for ScratchBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ScratchBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<[u8]> for ScratchBuf {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_returns_empty_buffer() {
        let pool = BufferPool::new(2, 128);

        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"previous call contents");
        }

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 128);
    }

    #[test]
    fn test_pool_grows_under_contention() {
        let pool = BufferPool::new(1, 16);
        let a = pool.acquire();
        let b = pool.acquire();
        assert!(a.is_empty() && b.is_empty());
    }
}
