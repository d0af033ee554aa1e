//! Communication resources bound to one scatter plan.
//!
//! A [`Channel`] is built once per plan from its index plans and the
//! configured [`TransportKind`], and owns every resource the transport needs
//! (claimed mailbox lanes, exposed windows, in-flight exchange tasks). All of
//! them are RAII handles, so dropping the channel releases them.

use crate::collective::{DenseTable, ExchangeHandle, alltoallv, barrier, recv_message, send_message};
use crate::comm::Communicator;
use crate::error::{Result, ScatterError};
use crate::protocol::PlanMessage;
use crate::scatter::index_plan::IndexPlan;
use crate::transport::{ClaimedLane, Window};
use crate::types::{Rank, ScatterDirection, TransportKind};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

/// Tags consumed by one channel.
pub(crate) const CHANNEL_TAGS: u64 = 4;

/// Tags of one channel. Data tags double as window ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChannelTags {
    base: u64,
}

impl ChannelTags {
    pub(crate) fn new(base: u64) -> Self {
        Self { base }
    }

    pub(crate) fn data(self, direction: ScatterDirection) -> u64 {
        match direction {
            ScatterDirection::Forward => self.base,
            ScatterDirection::Reverse => self.base + 1,
        }
    }

    fn window_offsets(self, direction: ScatterDirection) -> u64 {
        match direction {
            ScatterDirection::Forward => self.base + 2,
            ScatterDirection::Reverse => self.base + 3,
        }
    }
}

/// One peer's bytes within a packed buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub peer: Rank,
    pub bytes: Range<usize>,
}

/// Byte layout of one direction: what goes out to whom, what comes in from
/// whom. Segments are in peer-rank order and packed back to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Route {
    pub sends: Vec<Segment>,
    pub recvs: Vec<Segment>,
}

impl Route {
    fn new(send: &IndexPlan, recv: &IndexPlan, block_bytes: usize) -> Self {
        Self {
            sends: segments(send, block_bytes),
            recvs: segments(recv, block_bytes),
        }
    }

    pub fn recv_len(&self) -> usize {
        self.recvs.last().map_or(0, |s| s.bytes.end)
    }

    fn dense(&self, world: usize) -> DenseTable {
        let sizes = |segs: &[Segment]| -> Vec<(Rank, usize)> {
            segs.iter().map(|s| (s.peer, s.bytes.len())).collect()
        };
        DenseTable::from_segments(world, &sizes(&self.sends), &sizes(&self.recvs))
    }
}

fn segments(plan: &IndexPlan, block_bytes: usize) -> Vec<Segment> {
    plan.peers()
        .iter()
        .enumerate()
        .map(|(i, &peer)| {
            let blocks = plan.segment_range(i);
            Segment {
                peer,
                bytes: blocks.start * block_bytes..blocks.end * block_bytes,
            }
        })
        .collect()
}

/// A window region this rank receives into, plus where its own sends land
/// in each target's region.
struct WindowPorts {
    region: Window,
    /// Remote byte offset for each send segment, in route order.
    targets: Vec<usize>,
}

enum Ports {
    LocalOnly,
    PointToPoint {
        ready: bool,
        /// One claimed lane per receive segment, in route order.
        forward: Vec<ClaimedLane>,
        reverse: Vec<ClaimedLane>,
    },
    AllToAllV {
        forward: DenseTable,
        reverse: DenseTable,
    },
    Window {
        forward: WindowPorts,
        reverse: WindowPorts,
    },
}

pub(crate) struct Channel {
    kind: Option<TransportKind>,
    tags: ChannelTags,
    forward: Route,
    reverse: Route,
    ports: Ports,
    exchange: Option<ExchangeHandle<Vec<u8>>>,
}

impl Channel {
    /// Build the channel (collective for every transport except
    /// point-to-point).
    ///
    /// `remote` is whether any rank has cross-rank traffic; when it is false
    /// no resources are acquired on any rank.
    pub(crate) async fn build(
        comm: &Communicator,
        transport: TransportKind,
        to: &IndexPlan,
        from: &IndexPlan,
        block_bytes: usize,
        remote: bool,
        tags: ChannelTags,
    ) -> Result<Self> {
        let forward = Route::new(to, from, block_bytes);
        let reverse = Route::new(from, to, block_bytes);

        if !remote {
            return Ok(Self {
                kind: None,
                tags,
                forward,
                reverse,
                ports: Ports::LocalOnly,
                exchange: None,
            });
        }

        let ports = match transport {
            TransportKind::PointToPoint | TransportKind::ReadyReceiver => {
                let ready = transport == TransportKind::ReadyReceiver;
                let claim = |route: &Route, direction| -> Result<Vec<ClaimedLane>> {
                    route
                        .recvs
                        .iter()
                        .map(|s| comm.claim_lane(s.peer, tags.data(direction)))
                        .collect()
                };
                let fwd_lanes = claim(&forward, ScatterDirection::Forward)?;
                let rev_lanes = claim(&reverse, ScatterDirection::Reverse)?;
                if ready {
                    for lane in fwd_lanes.iter().chain(&rev_lanes) {
                        comm.post_recv(lane.source(), lane.tag())?;
                    }
                    // No rank may ready-send before every receive is posted.
                    barrier(comm, comm.config().barrier_timeout).await?;
                }
                Ports::PointToPoint {
                    ready,
                    forward: fwd_lanes,
                    reverse: rev_lanes,
                }
            }
            TransportKind::AllToAllV => {
                let world = comm.world_size() as usize;
                Ports::AllToAllV {
                    forward: forward.dense(world),
                    reverse: reverse.dense(world),
                }
            }
            TransportKind::Window => Ports::Window {
                forward: expose(comm, &forward, tags, ScatterDirection::Forward).await?,
                reverse: expose(comm, &reverse, tags, ScatterDirection::Reverse).await?,
            },
        };

        tracing::debug!(
            rank = comm.rank(),
            transport = %transport,
            send_peers = forward.sends.len(),
            recv_peers = forward.recvs.len(),
            "scatter channel built"
        );
        Ok(Self {
            kind: Some(transport),
            tags,
            forward,
            reverse,
            ports,
            exchange: None,
        })
    }

    /// Transport in use, or `None` when no rank has remote traffic.
    pub(crate) fn kind(&self) -> Option<TransportKind> {
        self.kind
    }

    /// Whether `finish` has anything to wait for.
    pub(crate) fn is_local_only(&self) -> bool {
        matches!(self.ports, Ports::LocalOnly)
    }

    /// Issue this rank's sends for `direction`. `send` holds the packed
    /// segments laid out as in [`Route::sends`].
    pub(crate) async fn start(
        &mut self,
        comm: &Arc<Communicator>,
        direction: ScatterDirection,
        send: &[u8],
    ) -> Result<()> {
        let route = match direction {
            ScatterDirection::Forward => &self.forward,
            ScatterDirection::Reverse => &self.reverse,
        };
        let tag = self.tags.data(direction);

        match &self.ports {
            Ports::LocalOnly => {}
            Ports::PointToPoint { ready, .. } => {
                for seg in &route.sends {
                    let buf = comm.buffer_pool().checkout_from(&send[seg.bytes.clone()]);
                    if *ready {
                        comm.ready_send(seg.peer, tag, buf).await?;
                    } else {
                        comm.send_buf(seg.peer, tag, buf).await?;
                    }
                }
            }
            Ports::AllToAllV { forward, reverse } => {
                let table = match direction {
                    ScatterDirection::Forward => forward.clone(),
                    ScatterDirection::Reverse => reverse.clone(),
                };
                let comm = Arc::clone(comm);
                let payload = send.to_vec();
                self.exchange = Some(ExchangeHandle::spawn(async move {
                    alltoallv(&comm, &payload, &table, tag).await
                }));
            }
            Ports::Window { forward, reverse } => {
                let ports = match direction {
                    ScatterDirection::Forward => forward,
                    ScatterDirection::Reverse => reverse,
                };
                // Opening fence: every target has finished reading the
                // previous epoch's data.
                barrier(comm, comm.config().barrier_timeout).await?;
                for (seg, &offset) in route.sends.iter().zip(&ports.targets) {
                    comm.put(seg.peer, tag, offset, &send[seg.bytes.clone()]).await?;
                }
            }
        }
        Ok(())
    }

    /// Wait for this rank's receives for `direction`, handing each segment
    /// to `on_segment(index in route.recvs, bytes)`.
    ///
    /// Point-to-point segments are handled in arrival order unless
    /// `reproduce` is set, in which case they go in peer-rank order.
    pub(crate) async fn finish(
        &mut self,
        comm: &Communicator,
        direction: ScatterDirection,
        mut on_segment: impl FnMut(usize, &[u8]) -> Result<()>,
    ) -> Result<()> {
        let route = match direction {
            ScatterDirection::Forward => &self.forward,
            ScatterDirection::Reverse => &self.reverse,
        };

        match &mut self.ports {
            Ports::LocalOnly => Ok(()),
            Ports::PointToPoint { forward, reverse, .. } => {
                let lanes = match direction {
                    ScatterDirection::Forward => forward,
                    ScatterDirection::Reverse => reverse,
                };
                let timeout = comm.config().collective_timeout;
                let check = |i: usize, len: usize| -> Result<()> {
                    let expected = route.recvs[i].bytes.len();
                    if len != expected {
                        return Err(ScatterError::MessageLengthMismatch {
                            expected,
                            actual: len,
                        });
                    }
                    Ok(())
                };

                if comm.config().reproduce {
                    for (i, lane) in lanes.iter_mut().enumerate() {
                        let buf = recv_lane(lane, timeout).await?;
                        check(i, buf.len())?;
                        on_segment(i, &buf)?;
                    }
                } else {
                    let mut pending: FuturesUnordered<_> = lanes
                        .iter_mut()
                        .enumerate()
                        .map(|(i, lane)| async move { (i, recv_lane(lane, timeout).await) })
                        .collect();
                    while let Some((i, received)) = pending.next().await {
                        let buf = received?;
                        check(i, buf.len())?;
                        on_segment(i, &buf)?;
                    }
                }
                Ok(())
            }
            Ports::AllToAllV { .. } => {
                let handle = self.exchange.take().ok_or(ScatterError::NotInFlight)?;
                let received = handle.wait().await?;
                if received.len() != route.recv_len() {
                    return Err(ScatterError::MessageLengthMismatch {
                        expected: route.recv_len(),
                        actual: received.len(),
                    });
                }
                for (i, seg) in route.recvs.iter().enumerate() {
                    on_segment(i, &received[seg.bytes.clone()])?;
                }
                Ok(())
            }
            Ports::Window { forward, reverse } => {
                let ports = match direction {
                    ScatterDirection::Forward => forward,
                    ScatterDirection::Reverse => reverse,
                };
                // Closing fence: every put of this epoch has landed.
                barrier(comm, comm.config().barrier_timeout).await?;
                ports.region.read(|bytes| {
                    route
                        .recvs
                        .iter()
                        .enumerate()
                        .try_for_each(|(i, seg)| on_segment(i, &bytes[seg.bytes.clone()]))
                })?
            }
        }
    }

    /// Abort a spawned exchange, if any. Returns whether one was running.
    pub(crate) fn abort(&mut self) -> bool {
        self.exchange.take().is_some()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("kind", &self.kind)
            .field("tags", &self.tags)
            .field("forward", &self.forward)
            .field("reverse", &self.reverse)
            .finish_non_exhaustive()
    }
}

async fn recv_lane(lane: &mut ClaimedLane, timeout: Duration) -> Result<crate::transport::PooledBuf> {
    let src = lane.source();
    tokio::time::timeout(timeout, lane.recv())
        .await
        .map_err(|_| ScatterError::CollectiveFailed {
            operation: "scatter_end",
            rank: src,
            reason: format!("no data after {}ms", timeout.as_millis()),
        })?
}

/// Expose this rank's receive region for `direction` and learn where each
/// of its sends lands on the target.
async fn expose(
    comm: &Communicator,
    route: &Route,
    tags: ChannelTags,
    direction: ScatterDirection,
) -> Result<WindowPorts> {
    let region = comm.expose_window(tags.data(direction), route.recv_len())?;
    let tag = tags.window_offsets(direction);

    // The region exists before any peer learns an offset into it.
    for seg in &route.recvs {
        let msg = PlanMessage::WindowOffset {
            offset: seg.bytes.start as u64,
        };
        send_message(comm, seg.peer, tag, &msg, "window_offsets").await?;
    }
    let mut targets = Vec::with_capacity(route.sends.len());
    for seg in &route.sends {
        match recv_message(comm, seg.peer, tag, "window_offsets").await? {
            PlanMessage::WindowOffset { offset } => targets.push(offset as usize),
            other => {
                return Err(ScatterError::DecodeFailed(format!(
                    "expected WindowOffset, got {}",
                    other.kind()
                )));
            }
        }
    }
    Ok(WindowPorts { region, targets })
}
