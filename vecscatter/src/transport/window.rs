use crate::error::{Result, ScatterError};
use crate::types::Rank;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Region = Arc<Mutex<Vec<u8>>>;

/// Mesh-wide table of exposed one-sided memory regions.
///
/// A region is identified by `(window id, owner rank)`. Any rank may `put`
/// into a region another rank exposed; the owner reads it back through its
/// [`Window`] handle. Synchronisation (fences) is the caller's job.
#[derive(Default)]
pub struct WindowRegistry {
    regions: Mutex<HashMap<(u64, Rank), Region>>,
}

impl WindowRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Expose a zeroed region of `len` bytes owned by `rank`.
    pub fn expose(self: &Arc<Self>, id: u64, rank: Rank, len: usize) -> Result<Window> {
        let region: Region = Arc::new(Mutex::new(vec![0u8; len]));
        let mut regions = self
            .regions
            .lock()
            .map_err(|_| ScatterError::LockPoisoned("window registry"))?;
        if regions.contains_key(&(id, rank)) {
            return Err(ScatterError::Window {
                id,
                rank,
                reason: "already exposed".into(),
            });
        }
        regions.insert((id, rank), Arc::clone(&region));
        tracing::trace!(id, rank, len, "window exposed");
        Ok(Window {
            id,
            rank,
            region,
            registry: Arc::clone(self),
        })
    }

    /// Write `data` into `target`'s region `id` at `byte_offset`.
    pub fn put(&self, target: Rank, id: u64, byte_offset: usize, data: &[u8]) -> Result<()> {
        let region = {
            let regions = self
                .regions
                .lock()
                .map_err(|_| ScatterError::LockPoisoned("window registry"))?;
            regions
                .get(&(id, target))
                .cloned()
                .ok_or_else(|| ScatterError::Window {
                    id,
                    rank: target,
                    reason: "not exposed".into(),
                })?
        };
        let mut bytes = region
            .lock()
            .map_err(|_| ScatterError::LockPoisoned("window region"))?;
        let end = byte_offset + data.len();
        if end > bytes.len() {
            return Err(ScatterError::Window {
                id,
                rank: target,
                reason: format!("put [{byte_offset}, {end}) exceeds region of {} bytes", bytes.len()),
            });
        }
        bytes[byte_offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Drop every region owned by `rank`.
    pub fn revoke_all(&self, rank: Rank) {
        if let Ok(mut regions) = self.regions.lock() {
            regions.retain(|&(_, owner), _| owner != rank);
        }
    }

    pub fn exposed_count(&self) -> usize {
        self.regions.lock().map(|r| r.len()).unwrap_or(0)
    }
}

/// Scoped handle to a region this rank exposed. Dropping it withdraws the
/// region from the registry; later puts targeting it fail.
pub struct Window {
    id: u64,
    rank: Rank,
    region: Region,
    registry: Arc<WindowRegistry>,
}

impl Window {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.region.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the region's current contents.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let bytes = self
            .region
            .lock()
            .map_err(|_| ScatterError::LockPoisoned("window region"))?;
        Ok(f(&bytes))
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Ok(mut regions) = self.registry.regions.lock() {
            // Only remove our own region, not a successor under the same key.
            if regions
                .get(&(self.id, self.rank))
                .is_some_and(|r| Arc::ptr_eq(r, &self.region))
            {
                regions.remove(&(self.id, self.rank));
            }
        }
    }
}
