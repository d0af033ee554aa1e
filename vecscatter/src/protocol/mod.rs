pub mod codec;
pub mod message;

pub use codec::{decode_plan_message, encode_plan_message};
pub use message::PlanMessage;
