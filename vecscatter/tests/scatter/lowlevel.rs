use super::helpers::{ALL_TRANSPORTS, config, run_ranks};
use vecscatter::{CombineMode, PeerMessage, ScatterDirection, ScatterPlan, TransportKind};

#[tokio::test]
async fn test_create_from_messages() {
    for transport in ALL_TRANSPORTS {
        run_ranks(2, config(transport), |comm| async move {
            let rank = comm.rank();
            let (sends, recvs) = if rank == 0 {
                (
                    vec![PeerMessage::new(1, vec![0, 1]), PeerMessage::new(0, vec![2])],
                    vec![PeerMessage::new(1, vec![3]), PeerMessage::new(0, vec![0])],
                )
            } else {
                (
                    vec![PeerMessage::new(0, vec![2])],
                    vec![PeerMessage::new(0, vec![1, 0])],
                )
            };
            let mut plan = ScatterPlan::<i32>::create_from_messages(&comm, &sends, &recvs, 1)
                .await
                .unwrap();

            let x: Vec<i32> = (0..4).map(|i| (rank as i32 + 1) * 10 + i).collect();
            let mut y = vec![0; 4];
            plan.scatter(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
                .await
                .unwrap();
            let expected = if rank == 0 {
                vec![12, 0, 0, 22]
            } else {
                vec![11, 10, 0, 0]
            };
            assert_eq!(y, expected, "rank {rank}");
        })
        .await;
    }
}

#[tokio::test]
async fn test_create_from_messages_with_blocks() {
    run_ranks(2, config(TransportKind::PointToPoint), |comm| async move {
        let rank = comm.rank();
        let peer = 1 - rank;
        // Swap block 0 between the two ranks, bs = 2.
        let sends = vec![PeerMessage::new(peer, vec![0])];
        let recvs = vec![PeerMessage::new(peer, vec![0])];
        let mut plan = ScatterPlan::<u64>::create_from_messages(&comm, &sends, &recvs, 2)
            .await
            .unwrap();

        let x = vec![u64::from(rank) * 2, u64::from(rank) * 2 + 1];
        let mut y = vec![0; 2];
        plan.scatter(&x, &mut y, CombineMode::Overwrite, ScatterDirection::Forward)
            .await
            .unwrap();
        assert_eq!(y, vec![u64::from(peer) * 2, u64::from(peer) * 2 + 1]);
    })
    .await;
}
