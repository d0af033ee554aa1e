//! Builds the `to` / `from` index plans of a scatter.
//!
//! Each rank submits pairs `(src[i], dst[i])` of global block indices. The
//! submitter resolves both owners, ships every pair to the owner of its
//! source block, and that rank groups the pairs by destination owner. The
//! source owner keeps the source slots (its "to" side) and sends the
//! destination slots to the destination owner (its "from" side). Neither
//! round needs global knowledge of who talks to whom: message counts are
//! found with a reduce-scatter and lengths with any-source messages.

use crate::collective::{
    gather_message_lengths, gather_number_of_messages, recv_message, ring_reduce_scatter_sum,
    send_message,
};
use crate::comm::Communicator;
use crate::error::{Result, ScatterError};
use crate::layout::Layout;
use crate::protocol::PlanMessage;
use crate::scatter::index_plan::IndexPlan;
use crate::types::Rank;
use std::collections::{BTreeMap, HashSet};

/// Tags consumed by one planning run.
pub(crate) const PLANNER_TAGS: u64 = 6;

const TAG_AGREE: u64 = 0;
const TAG_PAIR_LENGTHS: u64 = 1;
const TAG_PAIRS: u64 = 2;
const TAG_OFFSET_COUNTS: u64 = 3;
const TAG_OFFSET_LENGTHS: u64 = 4;
const TAG_OFFSETS: u64 = 5;

/// A pre-grouped message for [`ScatterPlan::create_from_messages`].
///
/// `length` is the number of blocks; `indices` are local block indices.
///
/// [`ScatterPlan::create_from_messages`]: crate::ScatterPlan::create_from_messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMessage {
    pub peer: Rank,
    pub length: i64,
    pub indices: Vec<usize>,
}

impl PeerMessage {
    pub fn new(peer: Rank, indices: Vec<usize>) -> Self {
        Self {
            peer,
            length: indices.len() as i64,
            indices,
        }
    }
}

/// Output of the planner.
#[derive(Debug)]
pub(crate) struct Planned {
    pub to: IndexPlan,
    pub from: IndexPlan,
    /// Whether any rank has traffic with another rank.
    pub remote: bool,
}

/// One pair as seen by the owner of its source block.
#[derive(Debug, Clone, Copy)]
struct RoutedPair {
    src_off: usize,
    dst_owner: Rank,
    dst_off: usize,
}

/// Result of the agreement reduce-scatter that opens every planning run.
struct Agreement {
    /// Ranks that will send to this rank.
    nrecvs: usize,
    /// Ranks whose local input failed validation.
    rejected: u64,
    bs_agrees: bool,
    remote: bool,
}

/// One reduce-scatter settles four things at once: the in-degree of every
/// rank, whether any rank rejected its input, whether every rank passed the
/// same block size (Σbs = N·bs and Σbs² = N·bs² only if all agree), and
/// whether any rank has cross-rank traffic.
async fn agree(
    comm: &Communicator,
    targets: &[bool],
    rejected: bool,
    bs: usize,
    remote: bool,
    tag: u64,
) -> Result<Agreement> {
    const FIELDS: usize = 5;
    let world = comm.world_size() as usize;
    let bs64 = bs as u64;
    let mut data = Vec::with_capacity(world * FIELDS);
    for &t in targets {
        data.extend_from_slice(&[
            u64::from(t),
            u64::from(rejected),
            bs64,
            bs64.wrapping_mul(bs64),
            u64::from(remote),
        ]);
    }
    let sums = ring_reduce_scatter_sum(comm, &data, FIELDS, tag).await?;
    let n = world as u64;
    Ok(Agreement {
        nrecvs: sums[0] as usize,
        rejected: sums[1],
        bs_agrees: sums[2] == n.wrapping_mul(bs64)
            && sums[3] == n.wrapping_mul(bs64.wrapping_mul(bs64)),
        remote: sums[4] > 0,
    })
}

/// Turn the agreement into this rank's verdict. A rank with a local error
/// reports it; the others learn that a peer rejected the input.
fn settle(comm: &Communicator, agreement: &Agreement, local: Option<ScatterError>, bs: usize) -> Result<()> {
    if let Some(e) = local {
        return Err(e);
    }
    if agreement.rejected > 0 {
        return Err(ScatterError::CollectiveFailed {
            operation: "create_scatter",
            rank: comm.rank(),
            reason: format!("{} rank(s) rejected their index lists", agreement.rejected),
        });
    }
    if !agreement.bs_agrees {
        return Err(ScatterError::BlockSizeMismatch { local: bs });
    }
    Ok(())
}

fn check_layout(comm: &Communicator, layout: &Layout, argument: &str) -> Result<()> {
    if let Layout::Distributed(table) = layout
        && table.world_size() != comm.world_size()
    {
        return Err(ScatterError::InvalidPartition(format!(
            "{argument} layout spans {} ranks, communicator has {}",
            table.world_size(),
            comm.world_size()
        )));
    }
    Ok(())
}

/// Resolve every pair at the submitting rank and bucket it by source owner.
fn route_pairs(
    comm: &Communicator,
    src_idx: &[usize],
    dst_idx: &[usize],
    src_layout: &Layout,
    dst_layout: &Layout,
    bs: usize,
) -> Result<(Vec<Vec<RoutedPair>>, bool)> {
    if bs == 0 {
        return Err(ScatterError::InvalidBlockSize { bs });
    }
    if src_idx.len() != dst_idx.len() {
        return Err(ScatterError::PairCountMismatch {
            from: src_idx.len(),
            to: dst_idx.len(),
        });
    }
    check_layout(comm, src_layout, "source")?;
    check_layout(comm, dst_layout, "destination")?;

    let me = comm.rank();
    let mut src_resolver = src_layout.resolver(me, bs, "src");
    let mut dst_resolver = dst_layout.resolver(me, bs, "dst");
    let mut buckets: Vec<Vec<RoutedPair>> = vec![Vec::new(); comm.world_size() as usize];
    let mut remote = false;

    for (pos, (&s, &d)) in src_idx.iter().zip(dst_idx).enumerate() {
        let (src_owner, src_off) = src_resolver.resolve(s, pos)?;
        let (dst_owner, dst_off) = dst_resolver.resolve(d, pos)?;
        remote |= src_owner != dst_owner;
        buckets[src_owner as usize].push(RoutedPair {
            src_off,
            dst_owner,
            dst_off,
        });
    }
    Ok((buckets, remote))
}

/// Stable sort of parallel `(src, dst)` slot lists by source slot.
///
/// Lists that write a destination slot more than once keep submission
/// order, so the last `Overwrite` contribution stays last.
fn sort_by_source(src: &mut Vec<usize>, dst: &mut Vec<usize>) {
    let mut seen = HashSet::with_capacity(dst.len());
    if !dst.iter().all(|d| seen.insert(*d)) {
        return;
    }
    let mut pairs: Vec<(usize, usize)> = src.iter().copied().zip(dst.iter().copied()).collect();
    pairs.sort_by_key(|&(s, _)| s);
    (*src, *dst) = pairs.into_iter().unzip();
}

fn to_u64(slots: &[usize]) -> Vec<u64> {
    slots.iter().map(|&s| s as u64).collect()
}

fn to_usize(slots: Vec<u64>) -> Vec<usize> {
    slots.into_iter().map(|s| s as usize).collect()
}

/// Receive one announced message per `(peer, count)` and check its length.
async fn recv_announced<T>(
    comm: &Communicator,
    announced: &[(Rank, u64)],
    tag: u64,
    operation: &'static str,
    mut take: impl FnMut(PlanMessage) -> Result<(usize, T)>,
) -> Result<Vec<(Rank, T)>> {
    let mut out = Vec::with_capacity(announced.len());
    for &(peer, count) in announced {
        let msg = recv_message(comm, peer, tag, operation).await?;
        let (len, value) = take(msg)?;
        if len as u64 != count {
            return Err(ScatterError::MessageLengthMismatch {
                expected: count as usize,
                actual: len,
            });
        }
        out.push((peer, value));
    }
    Ok(out)
}

/// Plan a scatter from paired global block indices (collective).
#[allow(clippy::too_many_arguments)]
pub(crate) async fn plan_from_indices(
    comm: &Communicator,
    src_idx: &[usize],
    dst_idx: &[usize],
    src_layout: &Layout,
    dst_layout: &Layout,
    bs: usize,
    local_reorder: bool,
    tag_base: u64,
) -> Result<Planned> {
    let me = comm.rank();
    let world = comm.world_size() as usize;

    // Purely rank-private arrays: every pair is local, nothing to agree on.
    if src_layout.is_sequential() && dst_layout.is_sequential() {
        let (mut buckets, _) = route_pairs(comm, src_idx, dst_idx, src_layout, dst_layout, bs)?;
        let pairs = std::mem::take(&mut buckets[me as usize]);
        let (mut src, mut dst): (Vec<usize>, Vec<usize>) =
            pairs.iter().map(|p| (p.src_off, p.dst_off)).unzip();
        if local_reorder {
            sort_by_source(&mut src, &mut dst);
        }
        return Ok(Planned {
            to: IndexPlan::from_segments(Vec::new(), src),
            from: IndexPlan::from_segments(Vec::new(), dst),
            remote: false,
        });
    }

    // ── Round 1: route pairs to the owners of their source blocks ──────
    let routed = route_pairs(comm, src_idx, dst_idx, src_layout, dst_layout, bs);
    let (mut buckets, local_remote, local_err) = match routed {
        Ok((b, r)) => (b, r, None),
        Err(e) => (vec![Vec::new(); world], false, Some(e)),
    };
    let targets: Vec<bool> = buckets
        .iter()
        .enumerate()
        .map(|(r, b)| r != me as usize && !b.is_empty())
        .collect();
    let agreement = agree(
        comm,
        &targets,
        local_err.is_some(),
        bs,
        local_remote,
        tag_base + TAG_AGREE,
    )
    .await?;
    settle(comm, &agreement, local_err, bs)?;

    let outgoing: Vec<(Rank, u64)> = targets
        .iter()
        .enumerate()
        .filter(|&(_, &t)| t)
        .map(|(r, _)| (r as Rank, buckets[r].len() as u64))
        .collect();
    let announced = gather_message_lengths(
        comm,
        &outgoing,
        agreement.nrecvs,
        tag_base + TAG_PAIR_LENGTHS,
    )
    .await?;

    for &(peer, _) in &outgoing {
        let pairs = &buckets[peer as usize];
        let msg = PlanMessage::Pairs {
            src_offsets: pairs.iter().map(|p| p.src_off as u64).collect(),
            dst_owners: pairs.iter().map(|p| p.dst_owner).collect(),
            dst_offsets: pairs.iter().map(|p| p.dst_off as u64).collect(),
        };
        send_message(comm, peer, tag_base + TAG_PAIRS, &msg, "route_pairs").await?;
    }

    let received = recv_announced(comm, &announced, tag_base + TAG_PAIRS, "route_pairs", |msg| {
        match msg {
            PlanMessage::Pairs {
                src_offsets,
                dst_owners,
                dst_offsets,
            } => {
                let n = src_offsets.len();
                if dst_owners.len() != n || dst_offsets.len() != n {
                    return Err(ScatterError::DecodeFailed(format!(
                        "ragged Pairs message: {n} sources, {} owners, {} offsets",
                        dst_owners.len(),
                        dst_offsets.len()
                    )));
                }
                let pairs = src_offsets
                    .into_iter()
                    .zip(dst_owners)
                    .zip(dst_offsets)
                    .map(|((s, o), d)| RoutedPair {
                        src_off: s as usize,
                        dst_owner: o,
                        dst_off: d as usize,
                    })
                    .collect::<Vec<_>>();
                Ok((n, pairs))
            }
            other => Err(ScatterError::DecodeFailed(format!(
                "expected Pairs, got {}",
                other.kind()
            ))),
        }
    })
    .await?;

    // ── Group at the source owner, in submitting-rank order ────────────
    let mut incoming: Vec<(Rank, Vec<RoutedPair>)> = received;
    incoming.push((me, std::mem::take(&mut buckets[me as usize])));
    incoming.sort_by_key(|(r, _)| *r);

    let mut local_src = Vec::new();
    let mut local_dst = Vec::new();
    let mut outbound: BTreeMap<Rank, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (_, pairs) in incoming {
        for p in pairs {
            if p.dst_owner == me {
                local_src.push(p.src_off);
                local_dst.push(p.dst_off);
            } else {
                let seg = outbound.entry(p.dst_owner).or_default();
                seg.0.push(p.src_off);
                seg.1.push(p.dst_off);
            }
        }
    }
    if local_reorder {
        sort_by_source(&mut local_src, &mut local_dst);
        for (src, dst) in outbound.values_mut() {
            sort_by_source(src, dst);
        }
    }

    // ── Round 2: hand destination slots to destination owners ──────────
    let mut from_segments = Vec::new();
    if agreement.remote {
        let targets2: Vec<bool> = (0..world as Rank).map(|r| outbound.contains_key(&r)).collect();
        let nrecvs2 =
            gather_number_of_messages(comm, &targets2, tag_base + TAG_OFFSET_COUNTS).await?;

        let outgoing2: Vec<(Rank, u64)> = outbound
            .iter()
            .map(|(&r, (src, _))| (r, src.len() as u64))
            .collect();
        let announced2 =
            gather_message_lengths(comm, &outgoing2, nrecvs2, tag_base + TAG_OFFSET_LENGTHS).await?;

        for (&peer, (_, dst)) in &outbound {
            let msg = PlanMessage::Offsets {
                offsets: to_u64(dst),
            };
            send_message(comm, peer, tag_base + TAG_OFFSETS, &msg, "route_offsets").await?;
        }
        from_segments = recv_announced(
            comm,
            &announced2,
            tag_base + TAG_OFFSETS,
            "route_offsets",
            |msg| match msg {
                PlanMessage::Offsets { offsets } => Ok((offsets.len(), to_usize(offsets))),
                other => Err(ScatterError::DecodeFailed(format!(
                    "expected Offsets, got {}",
                    other.kind()
                ))),
            },
        )
        .await?;
    }

    let to_segments = outbound
        .into_iter()
        .map(|(peer, (src, _))| (peer, src))
        .collect();

    let to = IndexPlan::from_segments(to_segments, local_src);
    let from = IndexPlan::from_segments(from_segments, local_dst);
    tracing::debug!(
        rank = me,
        to_peers = to.peer_count(),
        from_peers = from.peer_count(),
        local = to.local().len(),
        "planned scatter"
    );
    Ok(Planned {
        to,
        from,
        remote: agreement.remote,
    })
}

/// Validate one side of a pre-grouped message list and split it into
/// remote segments and the self message.
fn split_messages(
    me: Rank,
    world: u32,
    messages: &[PeerMessage],
    bs: usize,
    argument: &'static str,
) -> Result<(Vec<(Rank, Vec<usize>)>, Vec<usize>)> {
    if bs == 0 {
        return Err(ScatterError::InvalidBlockSize { bs });
    }
    let mut seen = HashSet::with_capacity(messages.len());
    let mut segments = Vec::with_capacity(messages.len());
    let mut local = Vec::new();
    for (position, m) in messages.iter().enumerate() {
        if m.peer >= world {
            return Err(ScatterError::InvalidRank {
                rank: m.peer,
                world_size: world,
            });
        }
        if !seen.insert(m.peer) {
            return Err(ScatterError::DuplicatePeer {
                argument,
                peer: m.peer,
            });
        }
        if m.length < 0 {
            return Err(ScatterError::InvalidSegmentLength {
                argument,
                position,
                peer: m.peer,
                length: m.length,
                reason: "negative length".into(),
            });
        }
        if m.length as usize != m.indices.len() {
            return Err(ScatterError::InvalidSegmentLength {
                argument,
                position,
                peer: m.peer,
                length: m.length,
                reason: format!("{} indices supplied", m.indices.len()),
            });
        }
        // Whole blocks must stay addressable: (i + 1) * bs <= usize::MAX.
        let upper = usize::MAX / bs;
        if let Some(&index) = m.indices.iter().find(|&&i| i >= upper) {
            return Err(ScatterError::IndexOutOfRange {
                index,
                argument,
                position,
                upper,
            });
        }
        let slots: Vec<usize> = m.indices.iter().map(|&i| i * bs).collect();
        if m.peer == me {
            local = slots;
        } else if !slots.is_empty() {
            segments.push((m.peer, slots));
        }
    }
    Ok((segments, local))
}

/// Plan from pre-grouped `(peer, length, indices)` messages (collective).
///
/// Skips discovery; only the agreement round runs.
pub(crate) async fn plan_from_messages(
    comm: &Communicator,
    sends: &[PeerMessage],
    recvs: &[PeerMessage],
    bs: usize,
    tag_base: u64,
) -> Result<Planned> {
    let me = comm.rank();
    let world = comm.world_size();

    let split = split_messages(me, world, sends, bs, "sends").and_then(|to| {
        let from = split_messages(me, world, recvs, bs, "recvs")?;
        if to.1.len() != from.1.len() {
            return Err(ScatterError::PairCountMismatch {
                from: to.1.len(),
                to: from.1.len(),
            });
        }
        Ok((to, from))
    });

    let (parts, local_err) = match split {
        Ok(p) => (Some(p), None),
        Err(e) => (None, Some(e)),
    };
    let remote = parts
        .as_ref()
        .is_some_and(|(to, from)| !to.0.is_empty() || !from.0.is_empty());

    let agreement = agree(
        comm,
        &vec![false; world as usize],
        local_err.is_some(),
        bs,
        remote,
        tag_base + TAG_AGREE,
    )
    .await?;
    settle(comm, &agreement, local_err, bs)?;

    let ((to_segments, local_src), (from_segments, local_dst)) =
        parts.ok_or_else(|| ScatterError::transport("message split missing after validation"))?;
    Ok(Planned {
        to: IndexPlan::from_segments(to_segments, local_src),
        from: IndexPlan::from_segments(from_segments, local_dst),
        remote: agreement.remote,
    })
}
