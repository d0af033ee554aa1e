use crate::types::Rank;
use std::ops::Range;

/// One direction of a scatter plan: which local slots are exchanged with
/// which peers.
///
/// The ragged layout stores every peer's slots back to back in `indices`;
/// segment `i` (for `peers[i]`) is `indices[starts[i]..starts[i + 1]]`.
/// Slots are scalar offsets into the rank-local array, one per block.
/// `local` lists the slots of pairs that never leave this rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPlan {
    peers: Vec<Rank>,
    starts: Vec<usize>,
    indices: Vec<usize>,
    local: Vec<usize>,
}

impl IndexPlan {
    /// Build from per-peer segments. Empty segments are dropped and peers
    /// are ordered by rank.
    pub(crate) fn from_segments(mut segments: Vec<(Rank, Vec<usize>)>, local: Vec<usize>) -> Self {
        segments.retain(|(_, s)| !s.is_empty());
        segments.sort_by_key(|(peer, _)| *peer);

        let mut peers = Vec::with_capacity(segments.len());
        let mut starts = Vec::with_capacity(segments.len() + 1);
        let mut indices = Vec::with_capacity(segments.iter().map(|(_, s)| s.len()).sum());
        starts.push(0);
        for (peer, seg) in segments {
            peers.push(peer);
            indices.extend_from_slice(&seg);
            starts.push(indices.len());
        }
        Self {
            peers,
            starts,
            indices,
            local,
        }
    }

    pub fn peers(&self) -> &[Rank] {
        &self.peers
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Prefix offsets into [`indices`](Self::indices), `peer_count() + 1` long.
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn local(&self) -> &[usize] {
        &self.local
    }

    pub fn segment_range(&self, i: usize) -> Range<usize> {
        self.starts[i]..self.starts[i + 1]
    }

    pub fn segment(&self, i: usize) -> &[usize] {
        &self.indices[self.segment_range(i)]
    }

    /// Blocks exchanged with remote peers.
    pub fn remote_len(&self) -> usize {
        self.indices.len()
    }

    /// All blocks this direction handles, local and remote.
    pub fn total_len(&self) -> usize {
        self.indices.len() + self.local.len()
    }

    pub fn has_remote(&self) -> bool {
        !self.peers.is_empty()
    }

    /// Minimum local array length (in scalars) every slot fits in.
    pub fn required_len(&self, bs: usize) -> usize {
        self.indices
            .iter()
            .chain(&self.local)
            .max()
            .map_or(0, |&m| m.saturating_add(bs))
    }

    /// Whether the remote slots form one ascending run of whole blocks.
    pub fn is_contiguous(&self, bs: usize) -> bool {
        is_stride_run(&self.indices, bs)
    }
}

/// Same-rank portion of a plan that is a plain slice copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PureCopy {
    pub src_start: usize,
    pub dst_start: usize,
    /// Length in scalars.
    pub len: usize,
}

impl PureCopy {
    /// Detect a pure copy: both local slot lists are one ascending
    /// stride-`bs` run.
    pub fn detect(src: &[usize], dst: &[usize], bs: usize) -> Option<Self> {
        if src.is_empty() || src.len() != dst.len() {
            return None;
        }
        if !is_stride_run(src, bs) || !is_stride_run(dst, bs) {
            return None;
        }
        Some(Self {
            src_start: src[0],
            dst_start: dst[0],
            len: src.len() * bs,
        })
    }
}

fn is_stride_run(slots: &[usize], bs: usize) -> bool {
    slots.windows(2).all(|w| w[1] == w[0] + bs)
}
