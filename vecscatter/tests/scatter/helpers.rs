use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use vecscatter::{Communicator, Layout, PartitionTable, ScatterConfig, TransportKind};

pub const ALL_TRANSPORTS: [TransportKind; 4] = [
    TransportKind::PointToPoint,
    TransportKind::ReadyReceiver,
    TransportKind::AllToAllV,
    TransportKind::Window,
];

/// Config with short timeouts so a hung test fails instead of stalling.
pub fn config(transport: TransportKind) -> ScatterConfig {
    ScatterConfig {
        collective_timeout: Duration::from_secs(10),
        barrier_timeout: Duration::from_secs(10),
        ..ScatterConfig::default().with_transport(transport)
    }
}

/// Run `f` on every rank of a fresh local mesh concurrently and collect the
/// results in rank order. Keeps all communicators alive until every task
/// completes.
pub async fn run_ranks<F, Fut, T>(world_size: u32, config: ScatterConfig, f: F) -> Vec<T>
where
    F: Fn(Arc<Communicator>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let comms = Communicator::bootstrap_local_with_config(world_size, config)
        .await
        .unwrap();
    let comms: Vec<Arc<Communicator>> = comms.into_iter().map(Arc::new).collect();

    let f = Arc::new(f);
    let mut handles = Vec::new();
    for c in &comms {
        let c = Arc::clone(c);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(c).await }));
    }
    let mut out = Vec::with_capacity(handles.len());
    for h in handles {
        out.push(h.await.unwrap());
    }
    out
}

/// `global` scalars split evenly over `world` ranks.
pub fn uniform(global: usize, world: u32) -> Layout {
    Layout::distributed(PartitionTable::uniform(global, world).unwrap())
}

/// This rank's slice of a global vector whose entry `g` is `value(g)`.
pub fn local_values<T>(layout: &Layout, rank: u32, value: impl Fn(usize) -> T) -> Vec<T> {
    match layout {
        Layout::Distributed(table) => table.range(rank).map(value).collect(),
        Layout::Sequential { len } => (0..*len).map(value).collect(),
    }
}

/// Global index range owned by `rank`.
pub fn owned(layout: &Layout, rank: u32) -> std::ops::Range<usize> {
    match layout {
        Layout::Distributed(table) => table.range(rank),
        Layout::Sequential { len } => 0..*len,
    }
}
