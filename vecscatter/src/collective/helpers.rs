use crate::comm::Communicator;
use crate::error::{Result, ScatterError};
use crate::protocol::{PlanMessage, decode_plan_message, encode_plan_message};
use crate::transport::PooledBuf;
use crate::types::Rank;

/// Send bytes to a peer with timeout, wrapping errors as `CollectiveFailed`.
pub(crate) async fn collective_send(
    comm: &Communicator,
    dest: Rank,
    tag: u64,
    data: &[u8],
    operation: &'static str,
) -> Result<()> {
    let timeout = comm.config().collective_timeout;
    match tokio::time::timeout(timeout, comm.send_tagged(dest, tag, data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ScatterError::CollectiveFailed {
            operation,
            rank: dest,
            reason: e.to_string(),
        }),
        Err(_) => Err(ScatterError::CollectiveFailed {
            operation,
            rank: dest,
            reason: format!("send timed out after {}ms", timeout.as_millis()),
        }),
    }
}

/// Receive bytes from a peer with timeout, wrapping errors as `CollectiveFailed`.
pub(crate) async fn collective_recv(
    comm: &Communicator,
    src: Rank,
    tag: u64,
    operation: &'static str,
) -> Result<PooledBuf> {
    let timeout = comm.config().collective_timeout;
    match tokio::time::timeout(timeout, comm.recv_tagged(src, tag)).await {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(e)) => Err(ScatterError::CollectiveFailed {
            operation,
            rank: src,
            reason: e.to_string(),
        }),
        Err(_) => Err(ScatterError::CollectiveFailed {
            operation,
            rank: src,
            reason: format!("recv timed out after {}ms", timeout.as_millis()),
        }),
    }
}

/// Encode and send a control message.
pub(crate) async fn send_message(
    comm: &Communicator,
    dest: Rank,
    tag: u64,
    msg: &PlanMessage,
    operation: &'static str,
) -> Result<()> {
    let bytes = encode_plan_message(msg)?;
    collective_send(comm, dest, tag, &bytes, operation).await
}

/// Receive and decode a control message.
pub(crate) async fn recv_message(
    comm: &Communicator,
    src: Rank,
    tag: u64,
    operation: &'static str,
) -> Result<PlanMessage> {
    let buf = collective_recv(comm, src, tag, operation).await?;
    decode_plan_message(&buf)
}
