//! Scatter plans: index planning, channel construction, execution.

mod channel;
mod executor;
mod index_plan;
mod planner;

pub use executor::ScatterPlan;
pub use index_plan::{IndexPlan, PureCopy};
pub use planner::PeerMessage;
