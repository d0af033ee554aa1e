//! Ownership resolution: which rank holds a given global index.

use crate::error::{Result, ScatterError};
use crate::types::Rank;
use std::ops::Range;
use std::sync::Arc;

/// Contiguous ownership ranges of a distributed array, in scalar units.
///
/// `bounds[r]..bounds[r + 1]` is the range held by rank `r`. Bounds start at
/// 0 and are strictly increasing, so every rank owns at least one scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    bounds: Vec<usize>,
}

impl PartitionTable {
    pub fn new(bounds: Vec<usize>) -> Result<Self> {
        if bounds.len() < 2 {
            return Err(ScatterError::InvalidPartition(format!(
                "need at least 2 bounds, got {}",
                bounds.len()
            )));
        }
        if bounds[0] != 0 {
            return Err(ScatterError::InvalidPartition(format!(
                "first bound must be 0, got {}",
                bounds[0]
            )));
        }
        if let Some(w) = bounds.windows(2).position(|w| w[0] >= w[1]) {
            return Err(ScatterError::InvalidPartition(format!(
                "bounds not strictly increasing at rank {w}: {} >= {}",
                bounds[w],
                bounds[w + 1]
            )));
        }
        if u32::try_from(bounds.len() - 1).is_err() {
            return Err(ScatterError::InvalidPartition(
                "too many ranks for a u32 rank id".into(),
            ));
        }
        Ok(Self { bounds })
    }

    /// Build from each rank's local length.
    pub fn from_local_sizes(sizes: &[usize]) -> Result<Self> {
        let mut bounds = Vec::with_capacity(sizes.len() + 1);
        bounds.push(0);
        let mut acc = 0usize;
        for &s in sizes {
            acc += s;
            bounds.push(acc);
        }
        Self::new(bounds)
    }

    /// Split `global` scalars over `world` ranks, earlier ranks taking the
    /// remainder one scalar each.
    pub fn uniform(global: usize, world: u32) -> Result<Self> {
        let world_us = world as usize;
        if world_us == 0 {
            return Err(ScatterError::InvalidPartition("world size is 0".into()));
        }
        let base = global / world_us;
        let extra = global % world_us;
        let sizes: Vec<usize> = (0..world_us)
            .map(|r| base + usize::from(r < extra))
            .collect();
        Self::from_local_sizes(&sizes)
    }

    pub fn world_size(&self) -> u32 {
        (self.bounds.len() - 1) as u32
    }

    pub fn global_size(&self) -> usize {
        self.bounds[self.bounds.len() - 1]
    }

    pub fn bounds(&self) -> &[usize] {
        &self.bounds
    }

    /// Global range held by `rank`.
    pub fn range(&self, rank: Rank) -> Range<usize> {
        let r = rank as usize;
        self.bounds[r]..self.bounds[r + 1]
    }

    pub fn local_size(&self, rank: Rank) -> usize {
        self.range(rank).len()
    }

    /// Binary search for the rank owning `global`.
    ///
    /// Returns `None` when `global` is past the end of the array.
    pub fn owning_rank(&self, global: usize) -> Option<Rank> {
        if global >= self.global_size() {
            return None;
        }
        // First bound strictly greater than `global`, minus one.
        let upper = self.bounds.partition_point(|&b| b <= global);
        Some((upper - 1) as Rank)
    }

    pub fn cursor(&self) -> OwnerCursor<'_> {
        OwnerCursor {
            table: self,
            last: 0,
        }
    }
}

/// Linear-scan owner lookup that resumes from the previous hit.
///
/// Index streams are usually nearly sorted, so most lookups touch one or two
/// bounds. A lookup below the cached rank restarts the scan at rank 0.
pub struct OwnerCursor<'a> {
    table: &'a PartitionTable,
    last: usize,
}

impl OwnerCursor<'_> {
    pub fn resolve(&mut self, global: usize) -> Option<Rank> {
        let bounds = &self.table.bounds;
        if global >= self.table.global_size() {
            return None;
        }
        if global < bounds[self.last] {
            self.last = 0;
        }
        while bounds[self.last + 1] <= global {
            self.last += 1;
        }
        Some(self.last as Rank)
    }
}

/// Where the entries of a scatter's source or destination array live.
#[derive(Debug, Clone)]
pub enum Layout {
    /// Partitioned across the communicator's ranks.
    Distributed(Arc<PartitionTable>),
    /// Private to each rank; every index resolves to the calling rank.
    Sequential { len: usize },
}

impl Layout {
    pub fn distributed(table: PartitionTable) -> Self {
        Self::Distributed(Arc::new(table))
    }

    pub fn sequential(len: usize) -> Self {
        Self::Sequential { len }
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::Sequential { .. })
    }

    /// Number of scalars this rank holds locally.
    pub fn local_len(&self, rank: Rank) -> usize {
        match self {
            Self::Distributed(t) => t.local_size(rank),
            Self::Sequential { len } => *len,
        }
    }

    /// Resolver mapping block indices of this layout to `(owner, local offset)`.
    ///
    /// `argument` names the caller's index array in error reports.
    pub(crate) fn resolver(&self, me: Rank, bs: usize, argument: &'static str) -> BlockResolver<'_> {
        BlockResolver {
            me,
            bs,
            argument,
            layout: self,
            cursor: match self {
                Self::Distributed(t) => Some(t.cursor()),
                Self::Sequential { .. } => None,
            },
        }
    }
}

/// Stateful block lookup over one [`Layout`].
pub(crate) struct BlockResolver<'a> {
    me: Rank,
    bs: usize,
    argument: &'static str,
    layout: &'a Layout,
    cursor: Option<OwnerCursor<'a>>,
}

impl BlockResolver<'_> {
    /// Resolve block `index` (covering scalars `[index*bs, index*bs + bs)`),
    /// found at `position` in the caller's array.
    pub(crate) fn resolve(&mut self, index: usize, position: usize) -> Result<(Rank, usize)> {
        let bs = self.bs;
        let argument = self.argument;
        let out_of_range = |upper: usize| ScatterError::IndexOutOfRange {
            index,
            argument,
            position,
            upper,
        };
        match self.layout {
            Layout::Sequential { len } => {
                let upper = len / bs;
                if index >= upper {
                    return Err(out_of_range(upper));
                }
                Ok((self.me, index * bs))
            }
            Layout::Distributed(table) => {
                let upper = table.global_size() / bs;
                let start = index
                    .checked_mul(bs)
                    .ok_or_else(|| out_of_range(upper))?;
                let owner = self
                    .cursor
                    .as_mut()
                    .and_then(|c| c.resolve(start))
                    .ok_or_else(|| out_of_range(upper))?;
                let range = table.range(owner);
                let end = start + bs;
                if end > range.end {
                    return Err(ScatterError::BlockStraddlesPartition {
                        argument,
                        position,
                        start,
                        end,
                        rank: owner,
                    });
                }
                Ok((owner, start - range.start))
            }
        }
    }
}
