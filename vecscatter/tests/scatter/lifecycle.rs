use super::helpers::{ALL_TRANSPORTS, config, local_values, owned, run_ranks, uniform};
use std::sync::Arc;
use tokio::sync::Barrier;
use vecscatter::{CombineMode, ScatterDirection, ScatterPlan, TransportKind};

#[tokio::test]
async fn test_duplicate_runs_concurrently_with_original() {
    for transport in ALL_TRANSPORTS {
        run_ranks(2, config(transport), |comm| async move {
            let rank = comm.rank();
            let layout = uniform(6, 2);
            let src: Vec<usize> = owned(&layout, rank).collect();
            let dst: Vec<usize> = src.iter().map(|&g| 5 - g).collect();
            let mut first = ScatterPlan::<i64>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();
            let mut second = first.duplicate().await.unwrap();
            assert_eq!(first.to_plan(), second.to_plan());

            let x = local_values(&layout, rank, |g| g as i64);
            let mut y1 = vec![0; 3];
            let mut y2 = vec![0; 3];
            first
                .begin(&x, &mut y1, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            second
                .begin(&x, &mut y2, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            second.end(&mut y2).await.unwrap();
            first.end(&mut y1).await.unwrap();

            let expected = local_values(&layout, rank, |g| (5 - g) as i64);
            assert_eq!(y1, expected);
            assert_eq!(y2, expected);
        })
        .await;
    }
}

#[tokio::test]
async fn test_display_summarises_plan() {
    run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let rank = comm.rank();
        let layout = uniform(4, 2);
        let src: Vec<usize> = owned(&layout, rank).collect();
        let dst = [3 - src[0], src[1]];
        let plan = ScatterPlan::<f64>::create(&comm, &src, &dst, &layout, &layout, 1)
            .await
            .unwrap();
        let view = plan.to_string();
        assert!(view.contains("point-to-point"), "{view}");
        assert!(view.contains(&format!("rank {rank} of 2")), "{view}");
        assert!(view.contains(&format!("[{}: 1]", 1 - rank)), "{view}");
        assert!(view.contains("local 1 block(s) (pure copy)"), "{view}");
    })
    .await;
}

#[tokio::test]
async fn test_destroy_drains_in_flight_scatter() {
    for transport in ALL_TRANSPORTS {
        run_ranks(3, config(transport), |comm| async move {
            let rank = comm.rank();
            let layout = uniform(9, 3);
            let src: Vec<usize> = owned(&layout, rank).collect();
            let dst: Vec<usize> = src.iter().map(|&g| 8 - g).collect();
            let mut plan = ScatterPlan::<u64>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();

            let x = local_values(&layout, rank, |g| g as u64);
            let mut y = vec![0; 3];
            plan.begin(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            plan.destroy().await.unwrap();
        })
        .await;
    }
}

#[tokio::test]
async fn test_dropped_plan_does_not_disturb_the_next() {
    run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let rank = comm.rank();
        let layout = uniform(4, 2);
        let src: Vec<usize> = owned(&layout, rank).collect();
        let dst: Vec<usize> = src.iter().map(|&g| 3 - g).collect();
        let x = local_values(&layout, rank, |g| g as i32);

        {
            let mut plan = ScatterPlan::<i32>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();
            let mut y = vec![0; 2];
            plan.begin(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            // Dropped in flight.
        }

        let mut plan = ScatterPlan::<i32>::create(&comm, &src, &dst, &layout, &layout, 1)
            .await
            .unwrap();
        let mut y = vec![0; 2];
        plan.scatter(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
            .await
            .unwrap();
        assert_eq!(y, local_values(&layout, rank, |g| 3 - g as i32));
    })
    .await;
}

#[tokio::test]
async fn test_sends_to_a_dropped_plan_are_released() {
    let gate = Arc::new(Barrier::new(2));
    run_ranks(2, config(TransportKind::PointToPoint), move |comm| {
        let gate = Arc::clone(&gate);
        async move {
            let rank = comm.rank();
            let layout = uniform(4, 2);
            let src: Vec<usize> = owned(&layout, rank).collect();
            let dst: Vec<usize> = src.iter().map(|&g| 3 - g).collect();
            let x = local_values(&layout, rank, |g| g as i32);
            let mut plan = ScatterPlan::<i32>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();
            if rank == 1 {
                // Forward and reverse receive ports only.
                assert_eq!(comm.pending_lanes(), 2);
                drop(plan);
                gate.wait().await;
                // Rank 0 has now sent into the retired port.
                gate.wait().await;
                assert_eq!(comm.pending_lanes(), 0);
            } else {
                gate.wait().await;
                let mut y = vec![0; 2];
                plan.begin(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                    .await
                    .unwrap();
                gate.wait().await;
            }
        }
    })
    .await;
}
