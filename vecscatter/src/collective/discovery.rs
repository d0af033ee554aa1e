//! "Who is sending to me, and how much?" without an all-to-all of data.

use crate::collective::reduce_scatter::ring_reduce_scatter_sum;
use crate::comm::Communicator;
use crate::error::{Result, ScatterError};
use crate::protocol::{PlanMessage, decode_plan_message, encode_plan_message};
use crate::types::Rank;

/// Number of ranks that will send to this rank.
///
/// `targets[r]` is true when this rank will send to rank `r`. A
/// reduce-scatter of the 0/1 flags gives every rank its in-degree.
pub async fn gather_number_of_messages(
    comm: &Communicator,
    targets: &[bool],
    tag: u64,
) -> Result<usize> {
    let world = comm.world_size() as usize;
    if targets.len() != world {
        return Err(ScatterError::BufferSizeMismatch {
            expected: world,
            actual: targets.len(),
        });
    }
    let flags: Vec<u64> = targets.iter().map(|&t| u64::from(t)).collect();
    let reduced = ring_reduce_scatter_sum(comm, &flags, 1, tag).await?;
    Ok(reduced[0] as usize)
}

/// Exchange message lengths with an unknown set of senders.
///
/// Sends `Length { count }` to every `(peer, count)` in `outgoing`, then
/// takes `nrecvs` announcements from the any-source lane. Returns
/// `(sender, count)` sorted by sender rank.
pub async fn gather_message_lengths(
    comm: &Communicator,
    outgoing: &[(Rank, u64)],
    nrecvs: usize,
    tag: u64,
) -> Result<Vec<(Rank, u64)>> {
    for &(peer, count) in outgoing {
        let bytes = encode_plan_message(&PlanMessage::Length { count })?;
        comm.send_any(peer, tag, &bytes)
            .await
            .map_err(|e| ScatterError::CollectiveFailed {
                operation: "gather_lengths",
                rank: peer,
                reason: e.to_string(),
            })?;
    }

    let timeout = comm.config().collective_timeout;
    let mut lengths = Vec::with_capacity(nrecvs);
    for _ in 0..nrecvs {
        let (src, buf) = tokio::time::timeout(timeout, comm.recv_any(tag))
            .await
            .map_err(|_| ScatterError::CollectiveFailed {
                operation: "gather_lengths",
                rank: comm.rank(),
                reason: format!(
                    "timed out after {}ms with {} of {nrecvs} lengths received",
                    timeout.as_millis(),
                    lengths.len()
                ),
            })??;
        match decode_plan_message(&buf)? {
            PlanMessage::Length { count } => lengths.push((src, count)),
            other => {
                return Err(ScatterError::CollectiveFailed {
                    operation: "gather_lengths",
                    rank: src,
                    reason: format!("expected Length, got {}", other.kind()),
                });
            }
        }
    }
    lengths.sort_unstable_by_key(|&(src, _)| src);
    Ok(lengths)
}
