//! Rank-local communicator over an in-process mesh.

mod bootstrap;

use crate::config::ScatterConfig;
use crate::error::{Result, ScatterError};
use crate::transport::{BufferPool, ClaimedLane, Mailbox, PooledBuf, Window, WindowRegistry};
use crate::types::Rank;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Tags with this bit set belong to barriers; plan tags never reach it.
pub(crate) const BARRIER_TAG_BIT: u64 = 1 << 63;

/// Snapshot of a rank's outgoing traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    /// Messages sent and one-sided puts issued.
    pub messages_sent: u64,
    pub bytes_sent: u64,
}

#[derive(Default)]
struct TrafficCounters {
    messages: AtomicU64,
    bytes: AtomicU64,
}

impl TrafficCounters {
    fn record(&self, bytes: usize) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

/// One rank's endpoint in a local mesh.
///
/// Every rank owns a [`Mailbox`]; sending means delivering into the
/// destination's mailbox. All ranks share one [`WindowRegistry`] and one
/// [`BufferPool`].
pub struct Communicator {
    rank: Rank,
    world_size: u32,
    mailboxes: Arc<[Arc<Mailbox>]>,
    windows: Arc<WindowRegistry>,
    pool: Arc<BufferPool>,
    stats: TrafficCounters,
    /// Start at 1; tag 0 is never handed out.
    collective_tag: AtomicU64,
    barrier_epoch: AtomicU64,
    closed: AtomicBool,
    config: ScatterConfig,
}

impl Communicator {
    fn new(
        rank: Rank,
        mailboxes: Arc<[Arc<Mailbox>]>,
        windows: Arc<WindowRegistry>,
        pool: Arc<BufferPool>,
        config: ScatterConfig,
    ) -> Self {
        Self {
            rank,
            world_size: mailboxes.len() as u32,
            mailboxes,
            windows,
            pool,
            stats: TrafficCounters::default(),
            collective_tag: AtomicU64::new(1),
            barrier_epoch: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            config,
        }
    }

    /// This rank's index.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Total number of ranks.
    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    pub fn config(&self) -> &ScatterConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn stats(&self) -> TrafficStats {
        TrafficStats {
            messages_sent: self.stats.messages.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes.load(Ordering::Relaxed),
        }
    }

    /// Lanes currently held in this rank's mailbox: claimed receives plus
    /// messages waiting for a receiver.
    pub fn pending_lanes(&self) -> usize {
        self.mailbox().lane_count()
    }

    /// Next tag from this rank's collective counter.
    ///
    /// Ranks agree on tags without negotiation as long as every rank draws
    /// them in the same collective order.
    pub fn next_tag(&self) -> u64 {
        self.reserve_tags(1)
    }

    /// Reserve `n` consecutive tags and return the first.
    pub fn reserve_tags(&self, n: u64) -> u64 {
        self.collective_tag.fetch_add(n, Ordering::Relaxed)
    }

    pub(crate) fn next_barrier_epoch(&self) -> u64 {
        self.barrier_epoch.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailboxes[self.rank as usize]
    }

    fn check_rank(&self, rank: Rank) -> Result<()> {
        if rank >= self.world_size {
            return Err(ScatterError::InvalidRank {
                rank,
                world_size: self.world_size,
            });
        }
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScatterError::PeerDisconnected { rank: self.rank });
        }
        Ok(())
    }

    /// Send a pooled buffer to `dest` on `tag`.
    pub async fn send_buf(&self, dest: Rank, tag: u64, buf: PooledBuf) -> Result<()> {
        self.check_rank(dest)?;
        self.check_open()?;
        let len = buf.len();
        self.mailboxes[dest as usize].deliver(self.rank, tag, buf)?;
        self.stats.record(len);
        Ok(())
    }

    /// Send bytes to `dest` on `tag`.
    pub async fn send_tagged(&self, dest: Rank, tag: u64, data: &[u8]) -> Result<()> {
        self.send_buf(dest, tag, self.pool.checkout_from(data)).await
    }

    /// Ready-mode send: fails unless `dest` has a posted receive for
    /// `(self, tag)`.
    pub async fn ready_send(&self, dest: Rank, tag: u64, buf: PooledBuf) -> Result<()> {
        self.check_rank(dest)?;
        if !self.mailboxes[dest as usize].is_posted(self.rank, tag)? {
            return Err(ScatterError::ReceiverNotReady { dest, tag });
        }
        self.send_buf(dest, tag, buf).await
    }

    /// Receive the next message from `src` on `tag`.
    pub async fn recv_tagged(&self, src: Rank, tag: u64) -> Result<PooledBuf> {
        self.check_rank(src)?;
        let mut lane = self.mailbox().claim(src, tag, false)?;
        lane.recv().await
    }

    /// Send to the any-source lane of `dest` for `tag`.
    pub async fn send_any(&self, dest: Rank, tag: u64, data: &[u8]) -> Result<()> {
        self.check_rank(dest)?;
        self.check_open()?;
        self.mailboxes[dest as usize].deliver_any(self.rank, tag, self.pool.checkout_from(data))?;
        self.stats.record(data.len());
        Ok(())
    }

    /// Receive the next any-source message on `tag`, with its sender.
    pub async fn recv_any(&self, tag: u64) -> Result<(Rank, PooledBuf)> {
        let mut lane = self.mailbox().claim_any(tag)?;
        lane.recv().await
    }

    /// Claim the `(src, tag)` lane for the lifetime of a persistent receive.
    pub(crate) fn claim_lane(&self, src: Rank, tag: u64) -> Result<ClaimedLane> {
        self.check_rank(src)?;
        self.mailbox().claim(src, tag, true)
    }

    /// Announce that the persistent receive for `(src, tag)` is posted.
    pub(crate) fn post_recv(&self, src: Rank, tag: u64) -> Result<()> {
        self.mailbox().post(src, tag)
    }

    /// Expose `len` bytes under window `id` for peers to `put` into.
    pub fn expose_window(&self, id: u64, len: usize) -> Result<Window> {
        self.check_open()?;
        self.windows.expose(id, self.rank, len)
    }

    /// One-sided write into `target`'s window `id`.
    pub async fn put(&self, target: Rank, id: u64, byte_offset: usize, data: &[u8]) -> Result<()> {
        self.check_rank(target)?;
        self.check_open()?;
        self.windows.put(target, id, byte_offset, data)?;
        self.stats.record(data.len());
        Ok(())
    }

    /// Leave the mesh abruptly, as a crashed rank would.
    ///
    /// Peers' receives from this rank fail with `PeerDisconnected`, and so
    /// do their sends to it.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(rank = self.rank, "communicator closed");
        if let Err(e) = self.mailbox().close() {
            tracing::warn!(rank = self.rank, error = %e, "failed to close mailbox");
        }
        self.windows.revoke_all(self.rank);
        for (r, mb) in self.mailboxes.iter().enumerate() {
            if r as Rank != self.rank
                && let Err(e) = mb.depart(self.rank)
            {
                tracing::warn!(rank = self.rank, peer = r, error = %e, "failed to notify peer");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("world_size", &self.world_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
