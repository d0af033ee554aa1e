use crate::collective::helpers::{collective_recv, collective_send};
use crate::comm::Communicator;
use crate::error::{Result, ScatterError};

fn encode_u64s(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn accumulate_u64s(acc: &mut [u64], bytes: &[u8]) {
    for (a, chunk) in acc.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        *a = a.wrapping_add(u64::from_le_bytes(raw));
    }
}

/// Ring reduce-scatter with summation over `u64` counters.
///
/// `data` holds `world_size` chunks of `count` values; chunk `r` is this
/// rank's contribution to rank `r`. Returns the element-wise sum of every
/// rank's chunk for this rank. Uses N-1 ring rounds: in round `s`, rank `i`
/// forwards its partial sum of chunk `i - s - 1` and folds the incoming
/// partial of chunk `i - s - 2` into its buffer.
pub async fn ring_reduce_scatter_sum(
    comm: &Communicator,
    data: &[u64],
    count: usize,
    tag: u64,
) -> Result<Vec<u64>> {
    let world = comm.world_size() as usize;
    let rank = comm.rank() as usize;

    if data.len() != count * world {
        return Err(ScatterError::BufferSizeMismatch {
            expected: count * world * 8,
            actual: data.len() * 8,
        });
    }
    if world <= 1 {
        return Ok(data.to_vec());
    }

    let mut buf = data.to_vec();
    let chunk_bytes = count * 8;
    let next = ((rank + 1) % world) as u32;
    let prev = ((rank + world - 1) % world) as u32;

    for step in 0..(world - 1) {
        let send_idx = (rank + 2 * world - step - 1) % world;
        let recv_idx = (rank + 2 * world - step - 2) % world;

        let send_data = encode_u64s(&buf[send_idx * count..(send_idx + 1) * count]);

        let (_, received) = tokio::try_join!(
            collective_send(comm, next, tag, &send_data, "reduce_scatter"),
            collective_recv(comm, prev, tag, "reduce_scatter"),
        )?;

        if received.len() != chunk_bytes {
            return Err(ScatterError::BufferSizeMismatch {
                expected: chunk_bytes,
                actual: received.len(),
            });
        }
        accumulate_u64s(&mut buf[recv_idx * count..(recv_idx + 1) * count], &received);
    }

    Ok(buf[rank * count..(rank + 1) * count].to_vec())
}
