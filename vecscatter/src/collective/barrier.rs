use crate::comm::{BARRIER_TAG_BIT, Communicator};
use crate::error::{Result, ScatterError};
use crate::protocol::{PlanMessage, decode_plan_message, encode_plan_message};
use crate::types::Rank;
use std::time::Duration;

/// Threshold: use two-phase barrier for small worlds, dissemination for larger.
const DISSEMINATION_THRESHOLD: u32 = 5;

/// Barrier: returns once every rank has reached the same call.
///
/// Dispatches on world size:
/// - `two_phase_barrier` for world_size <= 4 (lower constant overhead)
/// - `dissemination_barrier` for world_size >= 5 (O(log N) rounds, no coordinator)
///
/// Each call draws a fresh epoch and runs on its own tag, so barriers of
/// different plans cannot consume each other's tokens.
pub async fn barrier(comm: &Communicator, timeout: Duration) -> Result<()> {
    let world = comm.world_size();
    if world <= 1 {
        return Ok(());
    }
    let epoch = comm.next_barrier_epoch();
    let tag = BARRIER_TAG_BIT | epoch;

    if world < DISSEMINATION_THRESHOLD {
        two_phase_barrier(comm, epoch, tag, timeout).await
    } else {
        dissemination_barrier(comm, epoch, tag, timeout).await
    }
}

async fn send_token(comm: &Communicator, dest: Rank, epoch: u64, tag: u64) -> Result<()> {
    let bytes = encode_plan_message(&PlanMessage::Barrier { epoch })?;
    comm.send_tagged(dest, tag, &bytes)
        .await
        .map_err(|e| ScatterError::CollectiveFailed {
            operation: "barrier",
            rank: dest,
            reason: e.to_string(),
        })
}

async fn recv_token(
    comm: &Communicator,
    src: Rank,
    epoch: u64,
    tag: u64,
    timeout: Duration,
) -> Result<()> {
    let buf = tokio::time::timeout(timeout, comm.recv_tagged(src, tag))
        .await
        .map_err(|_| ScatterError::CollectiveFailed {
            operation: "barrier",
            rank: src,
            reason: format!(
                "timed out waiting for Barrier(epoch={epoch}) after {}ms",
                timeout.as_millis()
            ),
        })?
        .map_err(|e| ScatterError::CollectiveFailed {
            operation: "barrier",
            rank: src,
            reason: e.to_string(),
        })?;

    match decode_plan_message(&buf)? {
        PlanMessage::Barrier { epoch: e } if e == epoch => Ok(()),
        other => Err(ScatterError::CollectiveFailed {
            operation: "barrier",
            rank: src,
            reason: format!("expected Barrier(epoch={epoch}), got {}", other.kind()),
        }),
    }
}

/// Two-phase barrier: all ranks report to rank 0, rank 0 releases everyone.
async fn two_phase_barrier(comm: &Communicator, epoch: u64, tag: u64, timeout: Duration) -> Result<()> {
    let world = comm.world_size();
    if comm.rank() == 0 {
        for r in 1..world {
            recv_token(comm, r, epoch, tag, timeout).await?;
        }
        for r in 1..world {
            send_token(comm, r, epoch, tag).await?;
        }
    } else {
        send_token(comm, 0, epoch, tag).await?;
        recv_token(comm, 0, epoch, tag, timeout).await?;
    }
    Ok(())
}

/// Dissemination barrier: in round r, rank i signals `(i + 2^r) % N` and
/// waits on `(i - 2^r) % N`. After `ceil(log2(N))` rounds every rank has
/// transitively heard from every other.
///
/// Tokens of different rounds share one tag; per-source FIFO order keeps
/// them apart.
async fn dissemination_barrier(
    comm: &Communicator,
    epoch: u64,
    tag: u64,
    timeout: Duration,
) -> Result<()> {
    let rank = comm.rank();
    let world = comm.world_size();
    let num_rounds = u32::BITS - (world - 1).leading_zeros();

    for round in 0..num_rounds {
        let distance = 1u32 << round;
        let send_to = (rank + distance) % world;
        let recv_from = (rank + world - distance) % world;

        let (send_result, recv_result) = tokio::join!(
            send_token(comm, send_to, epoch, tag),
            recv_token(comm, recv_from, epoch, tag, timeout),
        );
        send_result?;
        recv_result?;
    }
    Ok(())
}
