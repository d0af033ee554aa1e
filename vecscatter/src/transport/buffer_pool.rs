use crossbeam_queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Small tier: 256 buffers × 4 KiB, for control messages and short segments.
const SMALL_POOL_SIZE: usize = 256;
const SMALL_BUF_CAPACITY: usize = 4 * 1024;

/// Large tier: 32 buffers × 1 MiB, for packed scalar segments.
const LARGE_POOL_SIZE: usize = 32;
const LARGE_BUF_CAPACITY: usize = 1024 * 1024;

/// A two-tier lock-free pool of byte buffers shared by one local mesh.
///
/// Checkout picks the tier by requested size; requests above the large tier
/// capacity are allocated fresh and freed on drop. Buffers that have grown
/// beyond 4× their tier's capacity are dropped instead of returned.
pub struct BufferPool {
    small: ArrayQueue<Vec<u8>>,
    large: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    pub fn new() -> Arc<Self> {
        Self::with_config(SMALL_POOL_SIZE, LARGE_POOL_SIZE)
    }

    /// Custom tier sizes (primarily for testing).
    ///
    /// Pools start empty and fill as buffers are returned.
    pub fn with_config(small_count: usize, large_count: usize) -> Arc<Self> {
        Arc::new(Self {
            small: ArrayQueue::new(small_count.max(1)),
            large: ArrayQueue::new(large_count.max(1)),
        })
    }

    /// Check out a zeroed buffer of exactly `len` bytes.
    pub fn checkout(self: &Arc<Self>, len: usize) -> PooledBuf {
        let tier = PoolTier::for_size(len);
        let mut buf = match tier {
            PoolTier::Small => self
                .small
                .pop()
                .unwrap_or_else(|| Vec::with_capacity(SMALL_BUF_CAPACITY)),
            PoolTier::Large => self
                .large
                .pop()
                .unwrap_or_else(|| Vec::with_capacity(LARGE_BUF_CAPACITY)),
            PoolTier::Unpooled => Vec::with_capacity(len),
        };
        buf.resize(len, 0);
        PooledBuf {
            buf,
            pool: Arc::clone(self),
            tier,
        }
    }

    /// Check out a buffer holding a copy of `data`.
    pub fn checkout_from(self: &Arc<Self>, data: &[u8]) -> PooledBuf {
        let mut buf = self.checkout(data.len());
        buf.copy_from_slice(data);
        buf
    }

    fn return_buf(&self, mut buf: Vec<u8>, tier: PoolTier) {
        let (queue, max_cap) = match tier {
            PoolTier::Small => (&self.small, SMALL_BUF_CAPACITY * 4),
            PoolTier::Large => (&self.large, LARGE_BUF_CAPACITY * 4),
            PoolTier::Unpooled => return,
        };
        if buf.capacity() <= max_cap {
            buf.clear();
            let _ = queue.push(buf);
        }
    }

    /// Buffers currently idle in the small and large tiers.
    pub fn idle(&self) -> (usize, usize) {
        (self.small.len(), self.large.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolTier {
    Small,
    Large,
    Unpooled,
}

impl PoolTier {
    fn for_size(len: usize) -> Self {
        if len <= SMALL_BUF_CAPACITY {
            Self::Small
        } else if len <= LARGE_BUF_CAPACITY {
            Self::Large
        } else {
            Self::Unpooled
        }
    }
}

/// A buffer checked out from a [`BufferPool`]. Derefs to `[u8]`.
/// On drop, the underlying `Vec` is cleared and returned to its tier.
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
    tier: PoolTier,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.buf.len())
            .field("tier", &self.tier)
            .finish()
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.return_buf(buf, self.tier);
    }
}
