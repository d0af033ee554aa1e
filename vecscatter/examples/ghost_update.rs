//! Ghost-cell exchange for a 1-D periodic grid.
//!
//! A grid of 12 cells is split over 4 ranks. Each rank keeps a local
//! vector `[left ghost, owned cells..., right ghost]` and refreshes the
//! ghosts from its neighbours with one reusable scatter plan. The reverse
//! scatter with `Add` then folds ghost contributions back onto their owners.
//!
//! ```bash
//! cargo run --example ghost_update
//! ```

use std::sync::Arc;
use vecscatter::{
    CombineMode, Communicator, Layout, PartitionTable, ScatterDirection, ScatterPlan,
};

const WORLD: u32 = 4;
const CELLS: usize = 12;

async fn rank_main(comm: Arc<Communicator>) -> vecscatter::Result<String> {
    let rank = comm.rank();
    let table = PartitionTable::uniform(CELLS, WORLD)?;
    let owned = table.range(rank);
    let n = owned.len();

    let grid = Layout::distributed(table);
    let local = Layout::sequential(n + 2);

    // Owned cells land at 1..=n; neighbours fill slots 0 and n + 1.
    let left = (owned.start + CELLS - 1) % CELLS;
    let right = owned.end % CELLS;
    let mut src: Vec<usize> = owned.clone().collect();
    let mut dst: Vec<usize> = (1..=n).collect();
    src.extend([left, right]);
    dst.extend([0, n + 1]);

    let mut plan = ScatterPlan::<f64>::create(&comm, &src, &dst, &grid, &local, 1).await?;

    let cells: Vec<f64> = owned.map(|g| g as f64).collect();
    let mut with_ghosts = vec![0.0; n + 2];
    plan.scatter(&cells, &mut with_ghosts, CombineMode::Overwrite, ScatterDirection::Forward)
        .await?;

    // Each owned cell collects itself plus one copy per neighbour that
    // holds it as a ghost.
    let mut folded = vec![0.0; n];
    plan.scatter(&with_ghosts, &mut folded, CombineMode::Add, ScatterDirection::Reverse)
        .await?;

    let summary = format!("rank {rank}: ghosts {with_ghosts:?}, folded {folded:?}\n{plan}");
    plan.destroy().await?;
    Ok(summary)
}

#[tokio::main]
async fn main() -> vecscatter::Result<()> {
    let comms: Vec<Arc<Communicator>> = Communicator::bootstrap_local(WORLD)
        .await?
        .into_iter()
        .map(Arc::new)
        .collect();

    let handles: Vec<_> = comms
        .iter()
        .map(|c| tokio::spawn(rank_main(Arc::clone(c))))
        .collect();

    for handle in handles {
        let summary = handle
            .await
            .map_err(|e| vecscatter::ScatterError::transport_with_source("rank task failed", e))??;
        println!("{summary}");
    }
    Ok(())
}
