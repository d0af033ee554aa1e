//! Collectives used while building plans and by the collective transports.

mod alltoallv;
mod barrier;
mod discovery;
mod handle;
mod helpers;
mod reduce_scatter;

pub use alltoallv::{DenseTable, alltoallv};
pub use barrier::barrier;
pub use discovery::{gather_message_lengths, gather_number_of_messages};
pub use handle::ExchangeHandle;
pub use reduce_scatter::ring_reduce_scatter_sum;

pub(crate) use helpers::{recv_message, send_message};
