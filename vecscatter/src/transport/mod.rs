pub mod buffer_pool;
pub mod mailbox;
pub mod window;

pub use buffer_pool::{BufferPool, PooledBuf};
pub use mailbox::{ClaimedAnyLane, ClaimedLane, Mailbox};
pub use window::{Window, WindowRegistry};
