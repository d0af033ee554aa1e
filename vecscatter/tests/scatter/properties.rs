use super::helpers::{ALL_TRANSPORTS, config, local_values, owned, run_ranks, uniform};
use std::sync::Arc;
use vecscatter::{
    CombineMode, Communicator, Layout, ScatterDirection, ScatterPlan, TransportKind,
};

#[tokio::test]
async fn test_two_rank_reversal_shape() {
    for transport in ALL_TRANSPORTS {
        run_ranks(2, config(transport), |comm| async move {
            let rank = comm.rank();
            let layout = uniform(4, 2);
            // Rank 0 submits (0,3),(1,2); rank 1 submits (2,1),(3,0).
            let src: Vec<usize> = owned(&layout, rank).collect();
            let dst: Vec<usize> = src.iter().map(|&g| 3 - g).collect();
            let mut plan = ScatterPlan::<f64>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();

            assert_eq!(plan.to_plan().peer_count(), 1);
            assert_eq!(plan.from_plan().peer_count(), 1);
            assert_eq!(plan.to_plan().peers(), &[1 - rank]);
            assert!(plan.to_plan().local().is_empty());
            assert_eq!(plan.to_plan().remote_len(), 2);

            let x = local_values(&layout, rank, |g| g as f64 * 1.5);
            let mut y = vec![0.0; 2];
            plan.scatter(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            let expected = local_values(&layout, rank, |g| (3 - g) as f64 * 1.5);
            assert_eq!(y, expected, "rank {rank}");
        })
        .await;
    }
}

#[tokio::test]
async fn test_overwrite_is_idempotent() {
    for transport in ALL_TRANSPORTS {
        run_ranks(3, config(transport), |comm| async move {
            let rank = comm.rank();
            let layout = uniform(9, 3);
            let src: Vec<usize> = owned(&layout, rank).collect();
            let dst: Vec<usize> = src.iter().map(|&g| (2 * g) % 9).collect();
            let mut plan = ScatterPlan::<i64>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();

            let x = local_values(&layout, rank, |g| 7 * g as i64 - 3);
            let mut once = vec![-1; x.len()];
            plan.scatter(&x, &mut once, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            let mut twice = once.clone();
            plan.scatter(&x, &mut twice, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            assert_eq!(once, twice, "rank {rank}");
        })
        .await;
    }
}

/// Forward `Add` scatter of `x` sending global `g` to `(g / 2 + 5) % 8`,
/// through a plan built and destroyed for this call only.
async fn add_scatter(
    comm: &Arc<Communicator>,
    layout: &Layout,
    src: &[usize],
    x: &[u64],
    y: &mut [u64],
) {
    let dst: Vec<usize> = src.iter().map(|&g| (g / 2 + 5) % 8).collect();
    let mut plan = ScatterPlan::<u64>::create(comm, src, &dst, layout, layout, 1)
        .await
        .unwrap();
    plan.scatter(x, y, CombineMode::Add, ScatterDirection::Forward)
        .await
        .unwrap();
    plan.destroy().await.unwrap();
}

#[tokio::test]
async fn test_add_is_additive_over_disjoint_scatters() {
    for transport in [TransportKind::PointToPoint, TransportKind::Window] {
        run_ranks(2, config(transport), |comm| async move {
            let rank = comm.rank();
            let layout = uniform(8, 2);
            let all: Vec<usize> = owned(&layout, rank).collect();
            let even: Vec<usize> = all.iter().copied().filter(|g| g % 2 == 0).collect();
            let odd: Vec<usize> = all.iter().copied().filter(|g| g % 2 == 1).collect();
            let x = local_values(&layout, rank, |g| 1u64 << g);

            let mut split = vec![0u64; 4];
            add_scatter(&comm, &layout, &even, &x, &mut split).await;
            add_scatter(&comm, &layout, &odd, &x, &mut split).await;

            let mut union = vec![0u64; 4];
            add_scatter(&comm, &layout, &all, &x, &mut union).await;

            assert_eq!(split, union, "rank {rank}");
            assert!(union.iter().any(|&v| v != 0), "rank {rank}");
        })
        .await;
    }
}

#[tokio::test]
async fn test_block_moves_contiguous_scalars() {
    for transport in ALL_TRANSPORTS {
        run_ranks(2, config(transport), |comm| async move {
            let rank = comm.rank();
            let layout = uniform(12, 2);
            // Only rank 0 moves block 0 into block 1.
            let (src, dst): (Vec<usize>, Vec<usize>) =
                if rank == 0 { (vec![0], vec![1]) } else { (vec![], vec![]) };
            let mut plan = ScatterPlan::<f64>::create(&comm, &src, &dst, &layout, &layout, 3)
                .await
                .unwrap();

            let x: Vec<f64> = (1..=6).map(|v| v as f64 + 6.0 * rank as f64).collect();
            let mut y = vec![0.0; 6];
            plan.scatter(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            if rank == 0 {
                assert_eq!(y, vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
            } else {
                assert_eq!(y, vec![0.0; 6]);
            }
        })
        .await;
    }
}
