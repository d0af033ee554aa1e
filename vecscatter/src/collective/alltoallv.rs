use crate::collective::helpers::{collective_recv, collective_send};
use crate::comm::Communicator;
use crate::error::{Result, ScatterError};

/// Per-rank byte counts and displacements for one all-to-all(v) exchange.
///
/// All four vectors have one entry per rank. Entries for ranks this rank
/// does not talk to are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenseTable {
    pub send_counts: Vec<usize>,
    pub send_displs: Vec<usize>,
    pub recv_counts: Vec<usize>,
    pub recv_displs: Vec<usize>,
}

impl DenseTable {
    /// Build a table from sparse `(peer, bytes)` lists, laying segments out
    /// contiguously in list order.
    pub fn from_segments(world: usize, sends: &[(u32, usize)], recvs: &[(u32, usize)]) -> Self {
        let mut table = Self {
            send_counts: vec![0; world],
            send_displs: vec![0; world],
            recv_counts: vec![0; world],
            recv_displs: vec![0; world],
        };
        let mut off = 0;
        for &(peer, n) in sends {
            table.send_counts[peer as usize] = n;
            table.send_displs[peer as usize] = off;
            off += n;
        }
        let mut off = 0;
        for &(peer, n) in recvs {
            table.recv_counts[peer as usize] = n;
            table.recv_displs[peer as usize] = off;
            off += n;
        }
        table
    }

    pub fn total_send(&self) -> usize {
        self.send_counts.iter().sum()
    }

    pub fn total_recv(&self) -> usize {
        self.recv_counts.iter().sum()
    }
}

/// Pairwise all-to-all(v) over raw bytes.
///
/// Runs `N-1` exchange rounds: in round `s`, rank `i` sends to `i + s` and
/// receives from `i - s`. Zero-length segments are still exchanged so every
/// pair stays in lockstep. The self segment is copied locally.
pub async fn alltoallv(
    comm: &Communicator,
    send: &[u8],
    table: &DenseTable,
    tag: u64,
) -> Result<Vec<u8>> {
    let world = comm.world_size() as usize;
    let rank = comm.rank() as usize;
    let mut recv = vec![0u8; table.total_recv()];

    let segment = |counts: &[usize], displs: &[usize], r: usize| displs[r]..displs[r] + counts[r];

    let self_src = segment(&table.send_counts, &table.send_displs, rank);
    let self_dst = segment(&table.recv_counts, &table.recv_displs, rank);
    if self_src.len() != self_dst.len() {
        return Err(ScatterError::BufferSizeMismatch {
            expected: self_dst.len(),
            actual: self_src.len(),
        });
    }
    recv[self_dst].copy_from_slice(&send[self_src]);

    for step in 1..world {
        let send_to = (rank + step) % world;
        let recv_from = (rank + world - step) % world;

        let out = &send[segment(&table.send_counts, &table.send_displs, send_to)];
        let (_, received) = tokio::try_join!(
            collective_send(comm, send_to as u32, tag, out, "alltoallv"),
            collective_recv(comm, recv_from as u32, tag, "alltoallv"),
        )?;

        let dst = segment(&table.recv_counts, &table.recv_displs, recv_from);
        if received.len() != dst.len() {
            return Err(ScatterError::BufferSizeMismatch {
                expected: dst.len(),
                actual: received.len(),
            });
        }
        recv[dst].copy_from_slice(&received);
    }

    Ok(recv)
}
