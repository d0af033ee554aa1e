//! Parallel vector scatter/gather.
//!
//! A [`ScatterPlan`] moves blocks of scalars between two arrays that are
//! partitioned across the ranks of a [`Communicator`]. Planning is collective
//! and done once; each later scatter only packs, ships, and combines.

pub mod codec;
pub mod collective;
pub mod comm;
pub mod config;
pub mod error;
pub mod layout;
pub mod protocol;
pub mod scalar;
pub mod scatter;
pub mod transport;
pub mod types;

pub use codec::{BlockKernel, Kernels};
pub use comm::{Communicator, TrafficStats};
pub use config::ScatterConfig;
pub use error::{ErrorKind, Result, ScatterError};
pub use layout::{Layout, PartitionTable};
pub use scalar::{Complex64, Scalar};
pub use scatter::{IndexPlan, PeerMessage, PureCopy, ScatterPlan};
pub use types::{CombineMode, Rank, ScatterDirection, TransportKind};
