use crate::error::{Result, ScatterError};
use crate::transport::buffer_pool::PooledBuf;
use crate::types::Rank;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

type LaneKey = (Rank, u64);

/// Incoming-message demultiplexer for one rank.
///
/// Messages are routed into lanes keyed by `(source rank, tag)`. A lane is
/// created lazily by whichever comes first: a message arriving, or a
/// receiver claiming it. Each lane is an unbounded FIFO, so ordering within
/// one peer's stream on one tag is preserved.
///
/// Any-source lanes (keyed by tag only) carry `(source, payload)` pairs for
/// receivers that do not know who will send.
pub struct Mailbox {
    rank: Rank,
    state: Mutex<MailboxState>,
}

#[derive(Default)]
struct MailboxState {
    lanes: HashMap<LaneKey, Lane<PooledBuf>>,
    any: HashMap<u64, Lane<(Rank, PooledBuf)>>,
    /// Persistent receives announced ready for ready-mode sends.
    posted: HashSet<LaneKey>,
    /// Lanes whose persistent receiver went away. Tags are never reused,
    /// so late deliveries to these are dropped.
    retired: HashSet<LaneKey>,
    /// Peers that closed. Lanes from them deliver end-of-stream.
    departed: HashSet<Rank>,
    closed: bool,
}

/// A lane. `tx` is `None` once the source has departed; `rx` is `None`
/// while a receiver holds it.
struct Lane<T> {
    tx: Option<mpsc::UnboundedSender<T>>,
    rx: Option<mpsc::UnboundedReceiver<T>>,
}

impl<T> Lane<T> {
    fn open() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    fn departed() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self { tx: None, rx: Some(rx) }
    }
}

impl Mailbox {
    pub fn new(rank: Rank) -> Arc<Self> {
        Arc::new(Self {
            rank,
            state: Mutex::new(MailboxState::default()),
        })
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    fn lock(&self) -> Result<MutexGuard<'_, MailboxState>> {
        self.state
            .lock()
            .map_err(|_| ScatterError::LockPoisoned("mailbox"))
    }

    /// Deliver a payload from `src` on `tag`.
    pub fn deliver(&self, src: Rank, tag: u64, buf: PooledBuf) -> Result<()> {
        let mut st = self.lock()?;
        if st.closed {
            return Err(ScatterError::PeerDisconnected { rank: self.rank });
        }
        if st.retired.contains(&(src, tag)) {
            tracing::trace!(rank = self.rank, src, tag, "dropping delivery to a retired lane");
            return Ok(());
        }
        let departed = st.departed.contains(&src);
        let lane = st.lanes.entry((src, tag)).or_insert_with(|| {
            if departed {
                Lane::departed()
            } else {
                Lane::open()
            }
        });
        match &lane.tx {
            Some(tx) => tx
                .send(buf)
                .map_err(|_| ScatterError::PeerDisconnected { rank: self.rank }),
            None => Err(ScatterError::PeerDisconnected { rank: src }),
        }
    }

    /// Deliver a payload to the any-source lane for `tag`.
    pub fn deliver_any(&self, src: Rank, tag: u64, buf: PooledBuf) -> Result<()> {
        let mut st = self.lock()?;
        if st.closed {
            return Err(ScatterError::PeerDisconnected { rank: self.rank });
        }
        let lane = st.any.entry(tag).or_insert_with(Lane::open);
        match &lane.tx {
            Some(tx) => tx
                .send((src, buf))
                .map_err(|_| ScatterError::PeerDisconnected { rank: self.rank }),
            None => Err(ScatterError::PeerDisconnected { rank: self.rank }),
        }
    }

    /// Take the receiving end of the `(src, tag)` lane.
    ///
    /// A persistent claim retires the lane (and any posting for it) when
    /// dropped, discarding anything queued or delivered later. A one-shot
    /// claim puts the receiver back on drop, or removes the lane if nothing
    /// is queued.
    pub fn claim(self: &Arc<Self>, src: Rank, tag: u64, persistent: bool) -> Result<ClaimedLane> {
        let mut st = self.lock()?;
        st.retired.remove(&(src, tag));
        let departed = st.departed.contains(&src);
        let lane = st.lanes.entry((src, tag)).or_insert_with(|| {
            if departed {
                Lane::departed()
            } else {
                Lane::open()
            }
        });
        let rx = lane.rx.take().ok_or_else(|| {
            ScatterError::transport(format!(
                "rank {}: lane (src={src}, tag={tag}) already claimed",
                self.rank
            ))
        })?;
        Ok(ClaimedLane {
            mailbox: Arc::clone(self),
            key: (src, tag),
            rx: Some(rx),
            persistent,
        })
    }

    /// Take the any-source receiver for `tag`; returned on drop.
    pub fn claim_any(self: &Arc<Self>, tag: u64) -> Result<ClaimedAnyLane> {
        let mut st = self.lock()?;
        let lane = st.any.entry(tag).or_insert_with(Lane::open);
        let rx = lane.rx.take().ok_or_else(|| {
            ScatterError::transport(format!(
                "rank {}: any-source lane (tag={tag}) already claimed",
                self.rank
            ))
        })?;
        Ok(ClaimedAnyLane {
            mailbox: Arc::clone(self),
            tag,
            rx: Some(rx),
        })
    }

    /// Mark the persistent receive for `(src, tag)` as posted.
    pub fn post(&self, src: Rank, tag: u64) -> Result<()> {
        self.lock()?.posted.insert((src, tag));
        Ok(())
    }

    /// Cancel a posted receive. Returns whether it was posted.
    pub fn cancel(&self, src: Rank, tag: u64) -> Result<bool> {
        Ok(self.lock()?.posted.remove(&(src, tag)))
    }

    pub fn is_posted(&self, src: Rank, tag: u64) -> Result<bool> {
        let st = self.lock()?;
        Ok(!st.closed && st.posted.contains(&(src, tag)))
    }

    /// Record that `peer` closed: close every lane it feeds.
    pub fn depart(&self, peer: Rank) -> Result<()> {
        let mut st = self.lock()?;
        st.departed.insert(peer);
        for ((src, _), lane) in st.lanes.iter_mut() {
            if *src == peer {
                lane.tx = None;
            }
        }
        Ok(())
    }

    /// Close this mailbox: refuse new deliveries and end every lane.
    pub fn close(&self) -> Result<()> {
        let mut st = self.lock()?;
        st.closed = true;
        st.posted.clear();
        for lane in st.lanes.values_mut() {
            lane.tx = None;
        }
        for lane in st.any.values_mut() {
            lane.tx = None;
        }
        Ok(())
    }

    /// Number of live lanes (diagnostics and leak tests).
    pub fn lane_count(&self) -> usize {
        self.state.lock().map(|st| st.lanes.len()).unwrap_or(0)
    }

    pub fn posted_count(&self) -> usize {
        self.state.lock().map(|st| st.posted.len()).unwrap_or(0)
    }
}

/// Receiving end of one `(src, tag)` lane, held by a receiver.
pub struct ClaimedLane {
    mailbox: Arc<Mailbox>,
    key: LaneKey,
    rx: Option<mpsc::UnboundedReceiver<PooledBuf>>,
    persistent: bool,
}

impl ClaimedLane {
    pub fn source(&self) -> Rank {
        self.key.0
    }

    pub fn tag(&self) -> u64 {
        self.key.1
    }

    /// Wait for the next payload. End-of-stream means the source departed
    /// or this mailbox closed.
    pub async fn recv(&mut self) -> Result<PooledBuf> {
        let src = self.key.0;
        match self.rx.as_mut() {
            Some(rx) => rx
                .recv()
                .await
                .ok_or(ScatterError::PeerDisconnected { rank: src }),
            None => Err(ScatterError::PeerDisconnected { rank: src }),
        }
    }
}

impl Drop for ClaimedLane {
    fn drop(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        // Poisoned lock: the mailbox is unusable anyway.
        let Ok(mut st) = self.mailbox.state.lock() else {
            return;
        };
        if self.persistent {
            // A persistent receive going away takes its posting with it.
            st.posted.remove(&self.key);
            st.lanes.remove(&self.key);
            st.retired.insert(self.key);
        } else if rx.is_empty() {
            st.lanes.remove(&self.key);
        } else if let Some(lane) = st.lanes.get_mut(&self.key) {
            lane.rx = Some(rx);
        }
    }
}

/// Receiving end of an any-source lane.
pub struct ClaimedAnyLane {
    mailbox: Arc<Mailbox>,
    tag: u64,
    rx: Option<mpsc::UnboundedReceiver<(Rank, PooledBuf)>>,
}

impl ClaimedAnyLane {
    pub async fn recv(&mut self) -> Result<(Rank, PooledBuf)> {
        let me = self.mailbox.rank;
        match self.rx.as_mut() {
            Some(rx) => rx
                .recv()
                .await
                .ok_or(ScatterError::PeerDisconnected { rank: me }),
            None => Err(ScatterError::PeerDisconnected { rank: me }),
        }
    }
}

impl Drop for ClaimedAnyLane {
    fn drop(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        let Ok(mut st) = self.mailbox.state.lock() else {
            return;
        };
        if rx.is_empty() {
            st.any.remove(&self.tag);
        } else if let Some(lane) = st.any.get_mut(&self.tag) {
            lane.rx = Some(rx);
        }
    }
}
