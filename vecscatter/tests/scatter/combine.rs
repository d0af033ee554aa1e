use super::helpers::{ALL_TRANSPORTS, config, local_values, owned, run_ranks, uniform};
use vecscatter::{CombineMode, ScatterDirection, ScatterPlan, TransportKind};

#[tokio::test]
async fn test_add_mode_sums_duplicate_destinations() {
    for transport in ALL_TRANSPORTS {
        run_ranks(4, config(transport), |comm| async move {
            let rank = comm.rank();
            let layout = uniform(8, 4);
            let first = owned(&layout, rank).start;
            // Each rank submits the same pair twice.
            let src = [first, first];
            let dst = [0, 0];
            let mut plan = ScatterPlan::<i64>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();

            let x = local_values(&layout, rank, |g| g as i64 + 1);
            let mut y = vec![0; x.len()];
            plan.scatter(&x, &mut y, CombineMode::Add, ScatterDirection::Forward)
                .await
                .unwrap();
            // Firsts are 0, 2, 4, 6 holding 1, 3, 5, 7; each counted twice.
            let expected = if rank == 0 { vec![32, 0] } else { vec![0, 0] };
            assert_eq!(y, expected, "rank {rank}");
        })
        .await;
    }
}

#[tokio::test]
async fn test_max_mode_ignores_arrival_order() {
    for transport in ALL_TRANSPORTS {
        for (a, b) in [(5.0, 9.0), (9.0, 5.0)] {
            run_ranks(2, config(transport), move |comm| async move {
                let rank = comm.rank();
                let layout = uniform(4, 2);
                // Global 0 (rank 0) and global 2 (rank 1) both land on global 1.
                let src = [owned(&layout, rank).start];
                let dst = [1];
                let mut plan =
                    ScatterPlan::<f64>::create(&comm, &src, &dst, &layout, &layout, 1)
                        .await
                        .unwrap();

                let x = if rank == 0 { vec![a, 0.0] } else { vec![b, 0.0] };
                let mut y = vec![0.0; 2];
                plan.scatter(&x, &mut y, CombineMode::Max, ScatterDirection::Forward)
                    .await
                    .unwrap();
                if rank == 0 {
                    assert_eq!(y[1], 9.0);
                }
            })
            .await;
        }
    }
}

#[tokio::test]
async fn test_ignore_mode_leaves_destination() {
    run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let rank = comm.rank();
        let layout = uniform(4, 2);
        let src: Vec<usize> = owned(&layout, rank).collect();
        let dst: Vec<usize> = src.iter().map(|&g| 3 - g).collect();
        let mut plan = ScatterPlan::<u32>::create(&comm, &src, &dst, &layout, &layout, 1)
            .await
            .unwrap();

        let before = comm.stats();
        let x = vec![1, 2];
        let mut y = vec![42, 43];
        plan.scatter(&x, &mut y, CombineMode::Ignore, ScatterDirection::Forward)
            .await
            .unwrap();
        assert_eq!(y, vec![42, 43]);
        // Sends still ran.
        assert_eq!(comm.stats().messages_sent, before.messages_sent + 1);
    })
    .await;
}

#[tokio::test]
async fn test_reproduce_applies_peers_in_rank_order() {
    for transport in [TransportKind::PointToPoint, TransportKind::ReadyReceiver] {
        let mut cfg = config(transport);
        cfg.reproduce = true;
        run_ranks(3, cfg, |comm| async move {
            let rank = comm.rank();
            let layout = uniform(6, 3);
            let src = [owned(&layout, rank).start];
            let dst = [0];
            let mut plan = ScatterPlan::<i32>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();

            let x = vec![rank as i32 + 10, -1];
            let mut y = vec![0; 2];
            plan.scatter(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            // Local first, then rank 1, then rank 2.
            if rank == 0 {
                assert_eq!(y[0], 12);
            }
        })
        .await;
    }
}

#[tokio::test]
async fn test_overwrite_keeps_submission_order_under_reorder() {
    for local_reorder in [false, true] {
        let mut cfg = config(TransportKind::PointToPoint);
        cfg.local_reorder = local_reorder;
        let per_rank = run_ranks(2, cfg, |comm| async move {
            let rank = comm.rank();
            let layout = uniform(4, 2);
            // Rank 0 writes its second entry, then its first, into global 0
            // (local) and global 2 (remote).
            let (src, dst): (Vec<usize>, Vec<usize>) = if rank == 0 {
                (vec![1, 0, 1, 0], vec![0, 0, 2, 2])
            } else {
                (vec![], vec![])
            };
            let mut plan = ScatterPlan::<i32>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();

            let x = local_values(&layout, rank, |g| 100 * (g as i32 + 1));
            let mut y = vec![0; 2];
            plan.scatter(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            y
        })
        .await;
        assert_eq!(per_rank, vec![vec![100, 0], vec![100, 0]], "local_reorder {local_reorder}");
    }
}
