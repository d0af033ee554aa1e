use crate::comm::Communicator;
use crate::config::ScatterConfig;
use crate::error::{Result, ScatterError};
use crate::transport::{BufferPool, Mailbox, WindowRegistry};
use crate::types::Rank;
use std::sync::Arc;

impl Communicator {
    /// Bootstrap a mesh of `world_size` ranks inside this process.
    ///
    /// Each returned communicator is meant to be driven by its own tokio
    /// task. Options come from [`ScatterConfig::from_env`].
    pub async fn bootstrap_local(world_size: u32) -> Result<Vec<Communicator>> {
        Self::bootstrap_local_with_config(world_size, ScatterConfig::from_env()).await
    }

    /// Bootstrap a local mesh with explicit options, shared by every rank.
    pub async fn bootstrap_local_with_config(
        world_size: u32,
        config: ScatterConfig,
    ) -> Result<Vec<Communicator>> {
        if world_size == 0 {
            return Err(ScatterError::InvalidRank {
                rank: 0,
                world_size,
            });
        }
        let mailboxes: Arc<[Arc<Mailbox>]> = (0..world_size).map(Mailbox::new).collect();
        let windows = WindowRegistry::new();
        let pool = BufferPool::new();

        tracing::debug!(world_size, transport = %config.transport, "local mesh formed");

        Ok((0..world_size)
            .map(|rank: Rank| {
                Communicator::new(
                    rank,
                    Arc::clone(&mailboxes),
                    Arc::clone(&windows),
                    Arc::clone(&pool),
                    config.clone(),
                )
            })
            .collect())
    }
}
