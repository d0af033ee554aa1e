use super::helpers::{ALL_TRANSPORTS, config, local_values, owned, run_ranks, uniform};
use vecscatter::{CombineMode, ScatterDirection, ScatterPlan, TransportKind};

#[tokio::test]
async fn test_block_sizes_respect_boundaries() {
    for transport in ALL_TRANSPORTS {
        for bs in [3usize, 13] {
            run_ranks(2, config(transport), move |comm| async move {
                let rank = comm.rank();
                let layout = uniform(4 * bs, 2);
                // Blocks 0, 1 on rank 0 and 2, 3 on rank 1; mirror them.
                let src: Vec<usize> = (2 * rank as usize..2 * rank as usize + 2).collect();
                let dst: Vec<usize> = src.iter().map(|&b| 3 - b).collect();
                let mut plan =
                    ScatterPlan::<f32>::create(&comm, &src, &dst, &layout, &layout, bs)
                        .await
                        .unwrap();
                assert_eq!(plan.block_size(), bs);

                let x = local_values(&layout, rank, |g| g as f32);
                let mut y = vec![0.0; x.len()];
                plan.scatter(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                    .await
                    .unwrap();
                let expected = local_values(&layout, rank, |g| {
                    let (block, j) = (g / bs, g % bs);
                    ((3 - block) * bs + j) as f32
                });
                assert_eq!(y, expected, "rank {rank} bs {bs}");
            })
            .await;
        }
    }
}

#[tokio::test]
async fn test_transports_agree() {
    let mut outputs = Vec::new();
    for transport in ALL_TRANSPORTS {
        let per_rank = run_ranks(4, config(transport), |comm| async move {
            let rank = comm.rank();
            let layout = uniform(20, 4);
            // A scrambled many-to-many pattern with repeated destinations.
            let src: Vec<usize> = owned(&layout, rank).collect();
            let dst: Vec<usize> = src.iter().map(|&g| (g * 7 + 3) % 20 / 2 * 2).collect();
            let mut plan = ScatterPlan::<u64>::create(&comm, &src, &dst, &layout, &layout, 1)
                .await
                .unwrap();

            let x = local_values(&layout, rank, |g| (g as u64 + 1) * 1000);
            let mut y = local_values(&layout, rank, |g| g as u64);
            plan.scatter(&x, &mut y, CombineMode::Add, ScatterDirection::Forward)
                .await
                .unwrap();
            y
        })
        .await;
        outputs.push(per_rank);
    }
    for (t, out) in ALL_TRANSPORTS.iter().zip(&outputs).skip(1) {
        assert_eq!(out, &outputs[0], "{t} disagrees with point-to-point");
    }
}

#[tokio::test]
async fn test_point_to_point_sends_one_message_per_peer() {
    run_ranks(3, config(TransportKind::PointToPoint), |comm| async move {
        let rank = comm.rank();
        let layout = uniform(9, 3);
        // Every rank sends each of its entries to each other rank's start.
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for g in owned(&layout, rank) {
            for peer in 0..3 {
                if peer != rank {
                    src.push(g);
                    dst.push(owned(&layout, peer).start);
                }
            }
        }
        let mut plan = ScatterPlan::<f64>::create(&comm, &src, &dst, &layout, &layout, 1)
            .await
            .unwrap();
        assert_eq!(plan.to_plan().peer_count(), 2);
        assert_eq!(plan.from_plan().peer_count(), 2);
        assert_eq!(plan.to_plan().remote_len(), 6);

        let before = comm.stats();
        let x = vec![1.0; 3];
        let mut y = vec![0.0; 3];
        plan.scatter(&x, &mut y, CombineMode::Add, ScatterDirection::Forward)
            .await
            .unwrap();
        let after = comm.stats();
        assert_eq!(after.messages_sent - before.messages_sent, 2);
        assert_eq!(after.bytes_sent - before.bytes_sent, 6 * 8);
        assert_eq!(y, vec![6.0, 0.0, 0.0]);
    })
    .await;
}
