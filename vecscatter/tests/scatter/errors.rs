use super::helpers::{config, owned, run_ranks, uniform};
use vecscatter::{
    CombineMode, Complex64, ErrorKind, Layout, PartitionTable, PeerMessage, ScatterDirection,
    ScatterError, ScatterPlan, TransportKind,
};

#[tokio::test]
async fn test_out_of_range_index_fails_every_rank() {
    let results = run_ranks(3, config(TransportKind::PointToPoint), |comm| async move {
        let layout = uniform(8, 3);
        let (src, dst) = if comm.rank() == 1 {
            (vec![0, 100], vec![0, 1])
        } else {
            (vec![], vec![])
        };
        ScatterPlan::<f64>::create(&comm, &src, &dst, &layout, &layout, 1)
            .await
            .map(|_| ())
    })
    .await;

    match &results[1] {
        Err(e @ ScatterError::IndexOutOfRange {
            index: 100,
            argument: "src",
            position: 1,
            upper: 8,
        }) => assert_eq!(e.kind(), ErrorKind::Configuration),
        other => panic!("rank 1: unexpected {other:?}"),
    }
    for rank in [0, 2] {
        match &results[rank] {
            Err(e @ ScatterError::CollectiveFailed { operation, .. }) => {
                assert_eq!(*operation, "create_scatter");
                assert_eq!(e.kind(), ErrorKind::Transport);
            }
            other => panic!("rank {rank}: unexpected {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_block_straddling_a_partition_is_rejected() {
    let results = run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let layout = Layout::distributed(PartitionTable::new(vec![0, 4, 8]).unwrap());
        // bs = 3: block 1 covers [3, 6) and crosses into rank 1.
        let (src, dst) = if comm.rank() == 0 {
            (vec![1], vec![0])
        } else {
            (vec![], vec![])
        };
        ScatterPlan::<i32>::create(&comm, &src, &dst, &layout, &layout, 3)
            .await
            .map(|_| ())
    })
    .await;

    assert!(matches!(
        results[0],
        Err(ScatterError::BlockStraddlesPartition {
            argument: "src",
            start: 3,
            end: 6,
            rank: 0,
            ..
        })
    ));
    assert!(matches!(results[1], Err(ScatterError::CollectiveFailed { .. })));
}

#[tokio::test]
async fn test_block_size_disagreement() {
    let results = run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let layout = uniform(12, 2);
        let bs = comm.rank() as usize + 1;
        ScatterPlan::<f32>::create(&comm, &[], &[], &layout, &layout, bs)
            .await
            .map(|_| ())
    })
    .await;
    for (rank, r) in results.iter().enumerate() {
        match r {
            Err(ScatterError::BlockSizeMismatch { local }) => assert_eq!(*local, rank + 1),
            other => panic!("rank {rank}: unexpected {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_zero_block_size() {
    let results = run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let layout = uniform(4, 2);
        ScatterPlan::<u32>::create(&comm, &[], &[], &layout, &layout, 0)
            .await
            .map(|_| ())
    })
    .await;
    for r in &results {
        assert!(matches!(r, Err(ScatterError::InvalidBlockSize { bs: 0 })));
    }
}

#[tokio::test]
async fn test_layout_for_another_world_size() {
    let results = run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let layout = uniform(9, 3);
        ScatterPlan::<f64>::create(&comm, &[0], &[0], &layout, &layout, 1)
            .await
            .map(|_| ())
    })
    .await;
    for r in &results {
        assert!(matches!(r, Err(ScatterError::InvalidPartition(_))), "{r:?}");
    }
}

#[tokio::test]
async fn test_mismatched_index_lists() {
    let results = run_ranks(1, config(TransportKind::PointToPoint), |comm| async move {
        let layout = Layout::sequential(4);
        ScatterPlan::<f64>::create(&comm, &[0, 1], &[0], &layout, &layout, 1)
            .await
            .map(|_| ())
    })
    .await;
    assert!(matches!(
        results[0],
        Err(ScatterError::PairCountMismatch { from: 2, to: 1 })
    ));
}

#[tokio::test]
async fn test_bad_pre_grouped_messages() {
    let results = run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let sends = if comm.rank() == 0 {
            vec![PeerMessage {
                peer: 1,
                length: -2,
                indices: vec![],
            }]
        } else {
            vec![]
        };
        ScatterPlan::<f64>::create_from_messages(&comm, &sends, &[], 1)
            .await
            .map(|_| ())
    })
    .await;
    assert!(matches!(
        results[0],
        Err(ScatterError::InvalidSegmentLength {
            argument: "sends",
            peer: 1,
            length: -2,
            ..
        })
    ));
    assert!(matches!(results[1], Err(ScatterError::CollectiveFailed { .. })));
}

#[tokio::test]
async fn test_pre_grouped_block_past_address_space() {
    let results = run_ranks(1, config(TransportKind::PointToPoint), |comm| async move {
        let sends = [PeerMessage::new(0, vec![usize::MAX / 2])];
        let recvs = [PeerMessage::new(0, vec![0])];
        ScatterPlan::<f64>::create_from_messages(&comm, &sends, &recvs, 3)
            .await
            .map(|_| ())
    })
    .await;
    match &results[0] {
        Err(e @ ScatterError::IndexOutOfRange {
            argument: "sends",
            position: 0,
            index,
            ..
        }) => {
            assert_eq!(*index, usize::MAX / 2);
            assert_eq!(e.kind(), ErrorKind::Configuration);
        }
        other => panic!("expected IndexOutOfRange, got {other:?}"),
    }
}

#[tokio::test]
async fn test_state_machine_misuse() {
    run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let rank = comm.rank();
        let layout = uniform(4, 2);
        let src: Vec<usize> = owned(&layout, rank).collect();
        let dst: Vec<usize> = src.iter().map(|&g| 3 - g).collect();
        let mut plan = ScatterPlan::<i64>::create(&comm, &src, &dst, &layout, &layout, 1)
            .await
            .unwrap();

        let x = vec![1, 2];
        let mut y = vec![0; 2];
        let err = plan.end(&mut y).await.unwrap_err();
        assert!(matches!(err, ScatterError::NotInFlight));
        assert_eq!(err.kind(), ErrorKind::Usage);

        plan.begin(&x, &mut y, CombineMode::Add, ScatterDirection::Forward)
            .await
            .unwrap();
        assert!(plan.is_in_flight());
        assert!(matches!(
            plan.begin(&x, &mut y, CombineMode::Add, ScatterDirection::Forward)
                .await,
            Err(ScatterError::AlreadyInFlight)
        ));
        plan.end(&mut y).await.unwrap();
        assert!(!plan.is_in_flight());
    })
    .await;
}

#[tokio::test]
async fn test_short_arrays_are_rejected() {
    run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let rank = comm.rank();
        let layout = uniform(4, 2);
        let src: Vec<usize> = owned(&layout, rank).collect();
        let dst: Vec<usize> = src.iter().map(|&g| 3 - g).collect();
        let mut plan = ScatterPlan::<f64>::create(&comm, &src, &dst, &layout, &layout, 1)
            .await
            .unwrap();

        let mut y = vec![0.0; 2];
        assert!(matches!(
            plan.begin(&[1.0], &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                .await,
            Err(ScatterError::ArrayTooShort {
                array: "x",
                required: 2,
                actual: 1
            })
        ));
        // Nothing was sent, so the plan is still usable.
        plan.scatter(&[1.0, 2.0], &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
            .await
            .unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_max_on_complex_is_rejected_at_begin() {
    run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let rank = comm.rank();
        let layout = uniform(4, 2);
        let src: Vec<usize> = owned(&layout, rank).collect();
        let mut plan = ScatterPlan::<Complex64>::create(&comm, &src, &src, &layout, &layout, 1)
            .await
            .unwrap();

        let x = vec![Complex64::new(1.0, 2.0); 2];
        let mut y = vec![Complex64::default(); 2];
        let err = plan
            .begin(&x, &mut y, CombineMode::Max, ScatterDirection::Forward)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScatterError::UnsupportedCombineMode {
                mode: CombineMode::Max,
                scalar: "complex64"
            }
        ));
        assert!(!plan.is_in_flight());

        plan.scatter(&x, &mut y, CombineMode::Add, ScatterDirection::Forward)
            .await
            .unwrap();
        assert_eq!(y, x);
    })
    .await;
}
