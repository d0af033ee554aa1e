use crate::error::{Result, ScatterError};
use crate::protocol::message::PlanMessage;

/// Encode a `PlanMessage` into an rkyv byte buffer.
pub fn encode_plan_message(msg: &PlanMessage) -> Result<Vec<u8>> {
    let payload = rkyv::to_bytes::<rkyv::rancor::Error>(msg)
        .map_err(|e| ScatterError::EncodeFailed(e.to_string()))?;
    Ok(payload.to_vec())
}

/// Decode a `PlanMessage` from bytes produced by [`encode_plan_message`].
///
/// Received buffers carry no alignment guarantee, so the payload is copied
/// into an aligned scratch buffer before validation.
pub fn decode_plan_message(buf: &[u8]) -> Result<PlanMessage> {
    if buf.is_empty() {
        return Err(ScatterError::DecodeFailed("empty control message".into()));
    }
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(buf.len());
    aligned.extend_from_slice(buf);
    rkyv::from_bytes::<PlanMessage, rkyv::rancor::Error>(&aligned)
        .map_err(|e| ScatterError::DecodeFailed(e.to_string()))
}
