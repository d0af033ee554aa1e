use crate::codec::{BlockKernel, Kernels, check_mode, decode_from, encode_into};
use crate::comm::Communicator;
use crate::error::{Result, ScatterError};
use crate::layout::Layout;
use crate::scalar::Scalar;
use crate::scatter::channel::{CHANNEL_TAGS, Channel, ChannelTags};
use crate::scatter::index_plan::{IndexPlan, PureCopy};
use crate::scatter::planner::{PLANNER_TAGS, PeerMessage, Planned, plan_from_indices, plan_from_messages};
use crate::types::{CombineMode, ScatterDirection, TransportKind};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanState {
    Idle,
    InFlight {
        mode: CombineMode,
        direction: ScatterDirection,
    },
    /// A transport error interrupted a scatter; the plan cannot be reused.
    Failed,
}

/// A reusable schedule moving blocks of `S` between two distributed arrays.
///
/// Built once by the collective [`create`](Self::create), then driven by
/// any number of [`begin`](Self::begin) / [`end`](Self::end) pairs. Each
/// plan owns its own tags and window ids, so several plans may be in flight
/// at once.
///
/// ```text
///   begin(x, y)                         end(y)
///   ───────────                         ──────
///   pack x[to slots] ─► send buf ─► peers ─► recv ─► combine into y[from slots]
///   local: x[to.local] ──── combine ────► y[from.local]
/// ```
///
/// `Reverse` swaps the roles of `to` and `from`.
pub struct ScatterPlan<S: Scalar> {
    // Declaration order is drop order: channel resources are released
    // before the index arrays.
    channel: Channel,
    comm: Arc<Communicator>,
    to: IndexPlan,
    from: IndexPlan,
    pure_copy: Option<PureCopy>,
    kernels: Kernels<S>,
    state: PlanState,
    send_vals: Vec<S>,
    send_bytes: Vec<u8>,
    recv_vals: Vec<S>,
}

impl<S: Scalar> ScatterPlan<S> {
    /// Build a plan moving block `src_idx[i]` of the source array to block
    /// `dst_idx[i]` of the destination array (collective).
    ///
    /// Indices are global block indices: block `k` covers scalars
    /// `[k*bs, (k+1)*bs)`. Every rank must call this with the same `bs`,
    /// possibly with different (or empty) index lists. Duplicate pairs are
    /// kept; see [`CombineMode`] for how repeated destinations combine.
    pub async fn create(
        comm: &Arc<Communicator>,
        src_idx: &[usize],
        dst_idx: &[usize],
        src_layout: &Layout,
        dst_layout: &Layout,
        bs: usize,
    ) -> Result<Self> {
        let tag_base = comm.reserve_tags(PLANNER_TAGS + CHANNEL_TAGS);
        let planned = plan_from_indices(
            comm,
            src_idx,
            dst_idx,
            src_layout,
            dst_layout,
            bs,
            comm.config().local_reorder,
            tag_base,
        )
        .await?;
        Self::assemble(comm, planned, bs, tag_base).await
    }

    /// Build a plan from pre-grouped messages, skipping discovery
    /// (collective).
    ///
    /// `sends` lists, per peer, the local source blocks packed for it;
    /// `recvs` lists, per peer, the local destination blocks its data lands
    /// in. Both sides of every pair must agree on lengths and order. A
    /// message addressed to this rank becomes the local part of the plan.
    pub async fn create_from_messages(
        comm: &Arc<Communicator>,
        sends: &[PeerMessage],
        recvs: &[PeerMessage],
        bs: usize,
    ) -> Result<Self> {
        let tag_base = comm.reserve_tags(PLANNER_TAGS + CHANNEL_TAGS);
        let planned = plan_from_messages(comm, sends, recvs, bs, tag_base).await?;
        Self::assemble(comm, planned, bs, tag_base).await
    }

    async fn assemble(
        comm: &Arc<Communicator>,
        planned: Planned,
        bs: usize,
        tag_base: u64,
    ) -> Result<Self> {
        let Planned { to, from, remote } = planned;
        let kernels = BlockKernel::select(bs)?.kernels::<S>();
        let channel = Channel::build(
            comm,
            comm.config().transport,
            &to,
            &from,
            bs * S::SIZE,
            remote,
            ChannelTags::new(tag_base + PLANNER_TAGS),
        )
        .await?;
        let pure_copy = PureCopy::detect(to.local(), from.local(), bs);

        tracing::debug!(
            rank = comm.rank(),
            scalar = S::NAME,
            bs,
            kernel = ?kernels.kernel(),
            remote,
            pure_copy = pure_copy.is_some(),
            "scatter plan created"
        );
        Ok(Self {
            channel,
            comm: Arc::clone(comm),
            to,
            from,
            pure_copy,
            kernels,
            state: PlanState::Idle,
            send_vals: Vec::new(),
            send_bytes: Vec::new(),
            recv_vals: Vec::new(),
        })
    }

    /// Start a scatter: pack and send this rank's outgoing blocks of `x`
    /// and combine its rank-local pairs into `y`.
    ///
    /// Remote contributions reach `y` only in [`end`](Self::end), which must
    /// be called with the same `y` before the next `begin`. Window and
    /// all-to-all(v) transports synchronise inside `begin`/`end`, so on those
    /// every rank of the plan has to make the call.
    ///
    /// `Max` is rejected for scalar types without an ordering.
    pub async fn begin(
        &mut self,
        x: &[S],
        y: &mut [S],
        mode: CombineMode,
        direction: ScatterDirection,
    ) -> Result<()> {
        match self.state {
            PlanState::Idle => {}
            PlanState::InFlight { .. } => return Err(ScatterError::AlreadyInFlight),
            PlanState::Failed => return Err(ScatterError::PlanFailed),
        }
        check_mode::<S>(mode)?;

        let bs = self.kernels.block_size();
        let (send_plan, recv_plan) = match direction {
            ScatterDirection::Forward => (&self.to, &self.from),
            ScatterDirection::Reverse => (&self.from, &self.to),
        };
        check_len("x", x.len(), send_plan.required_len(bs))?;
        check_len("y", y.len(), recv_plan.required_len(bs))?;

        let n = send_plan.remote_len() * bs;
        self.send_vals.clear();
        self.send_vals.resize(n, S::default());
        self.kernels.pack(send_plan.indices(), x, &mut self.send_vals);
        self.send_bytes.clear();
        self.send_bytes.resize(n * S::SIZE, 0);
        encode_into(&self.send_vals, &mut self.send_bytes)?;

        let local = LocalPass {
            kernels: self.kernels,
            pure_copy: self.pure_copy,
            direction,
            src: send_plan.local(),
            dst: recv_plan.local(),
        };
        let started = if self.comm.config().send_first {
            let r = self.channel.start(&self.comm, direction, &self.send_bytes).await;
            local.apply(x, y, mode);
            r
        } else {
            local.apply(x, y, mode);
            self.channel.start(&self.comm, direction, &self.send_bytes).await
        };
        if let Err(e) = started {
            self.state = PlanState::Failed;
            tracing::warn!(rank = self.comm.rank(), %direction, error = %e, "scatter begin failed");
            return Err(e);
        }

        tracing::trace!(
            rank = self.comm.rank(),
            %mode,
            %direction,
            remote_blocks = send_plan.remote_len(),
            "scatter begun"
        );
        self.state = PlanState::InFlight { mode, direction };
        Ok(())
    }

    /// Finish the scatter started by [`begin`](Self::begin), combining every
    /// incoming block into `y`.
    ///
    /// Segments are combined in arrival order, or in peer-rank order when
    /// `reproduce` is configured. A too-short `y` leaves the scatter in
    /// flight; any transport error marks the plan failed.
    pub async fn end(&mut self, y: &mut [S]) -> Result<()> {
        let (mode, direction) = match self.state {
            PlanState::InFlight { mode, direction } => (mode, direction),
            PlanState::Idle => return Err(ScatterError::NotInFlight),
            PlanState::Failed => return Err(ScatterError::PlanFailed),
        };
        let bs = self.kernels.block_size();
        let recv_plan = match direction {
            ScatterDirection::Forward => &self.from,
            ScatterDirection::Reverse => &self.to,
        };
        check_len("y", y.len(), recv_plan.required_len(bs))?;

        let kernels = self.kernels;
        let recv_vals = &mut self.recv_vals;
        let finished = self
            .channel
            .finish(&self.comm, direction, |i, bytes| {
                if mode == CombineMode::Ignore {
                    return Ok(());
                }
                let offsets = recv_plan.segment(i);
                recv_vals.clear();
                recv_vals.resize(offsets.len() * bs, S::default());
                decode_from(bytes, recv_vals)?;
                kernels.unpack_combine(recv_vals, offsets, y, mode);
                Ok(())
            })
            .await;

        match finished {
            Ok(()) => {
                self.state = PlanState::Idle;
                Ok(())
            }
            Err(e) => {
                self.state = PlanState::Failed;
                tracing::warn!(rank = self.comm.rank(), %direction, error = %e, "scatter end failed");
                Err(e)
            }
        }
    }

    /// `begin` followed by `end`.
    pub async fn scatter(
        &mut self,
        x: &[S],
        y: &mut [S],
        mode: CombineMode,
        direction: ScatterDirection,
    ) -> Result<()> {
        self.begin(x, y, mode, direction).await?;
        self.end(y).await
    }

    /// A fresh plan with the same index plans and its own channel and tags
    /// (collective).
    pub async fn duplicate(&self) -> Result<Self> {
        let tag_base = self.comm.reserve_tags(PLANNER_TAGS + CHANNEL_TAGS);
        let planned = Planned {
            to: self.to.clone(),
            from: self.from.clone(),
            remote: !self.channel.is_local_only(),
        };
        Self::assemble(&self.comm, planned, self.kernels.block_size(), tag_base).await
    }

    /// Tear the plan down. A scatter still in flight is completed first,
    /// its data discarded.
    pub async fn destroy(mut self) -> Result<()> {
        let mut drained = Ok(());
        if let PlanState::InFlight { direction, .. } = self.state {
            tracing::debug!(rank = self.comm.rank(), %direction, "draining in-flight scatter before teardown");
            drained = self.channel.finish(&self.comm, direction, |_, _| Ok(())).await;
            self.state = PlanState::Idle;
        }
        drained
    }

    /// Blocks this rank sends in a forward scatter, by peer.
    pub fn to_plan(&self) -> &IndexPlan {
        &self.to
    }

    /// Blocks this rank receives in a forward scatter, by peer.
    pub fn from_plan(&self) -> &IndexPlan {
        &self.from
    }

    pub fn block_size(&self) -> usize {
        self.kernels.block_size()
    }

    /// Transport carrying remote traffic; `None` when no rank has any.
    pub fn transport(&self) -> Option<TransportKind> {
        self.channel.kind()
    }

    /// Whether the rank-local pairs reduce to one slice copy.
    pub fn is_pure_copy(&self) -> bool {
        self.pure_copy.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, PlanState::InFlight { .. })
    }

    pub fn communicator(&self) -> &Arc<Communicator> {
        &self.comm
    }
}

impl<S: Scalar> Drop for ScatterPlan<S> {
    fn drop(&mut self) {
        if let PlanState::InFlight { direction, .. } = self.state {
            let aborted = self.channel.abort();
            tracing::warn!(
                rank = self.comm.rank(),
                %direction,
                aborted,
                "scatter plan dropped in flight, cancelling its transfers"
            );
        }
    }
}

/// The rank-local half of a scatter.
struct LocalPass<'a, S> {
    kernels: Kernels<S>,
    pure_copy: Option<PureCopy>,
    direction: ScatterDirection,
    src: &'a [usize],
    dst: &'a [usize],
}

impl<S: Scalar> LocalPass<'_, S> {
    fn apply(&self, x: &[S], y: &mut [S], mode: CombineMode) {
        if mode == CombineMode::Overwrite
            && let Some(pc) = self.pure_copy
        {
            let (from, to) = match self.direction {
                ScatterDirection::Forward => (pc.src_start, pc.dst_start),
                ScatterDirection::Reverse => (pc.dst_start, pc.src_start),
            };
            y[to..to + pc.len].copy_from_slice(&x[from..from + pc.len]);
        } else {
            self.kernels.scatter_combine(self.src, x, self.dst, y, mode);
        }
    }
}

fn check_len(array: &'static str, actual: usize, required: usize) -> Result<()> {
    if actual < required {
        return Err(ScatterError::ArrayTooShort {
            array,
            required,
            actual,
        });
    }
    Ok(())
}

impl<S: Scalar> fmt::Display for ScatterPlan<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = self.channel.kind().map_or("local-only", TransportKind::name);
        writeln!(
            f,
            "scatter plan on rank {} of {}: {} x {} blocks, {}",
            self.comm.rank(),
            self.comm.world_size(),
            self.kernels.block_size(),
            S::NAME,
            transport
        )?;
        for (label, plan) in [("sends", &self.to), ("receives", &self.from)] {
            write!(
                f,
                "  {label} {} block(s) with {} peer(s)",
                plan.remote_len(),
                plan.peer_count()
            )?;
            for (i, peer) in plan.peers().iter().enumerate() {
                write!(f, " [{peer}: {}]", plan.segment(i).len())?;
            }
            writeln!(f)?;
        }
        write!(f, "  local {} block(s)", self.to.local().len())?;
        if self.pure_copy.is_some() {
            f.write_str(" (pure copy)")?;
        }
        Ok(())
    }
}

impl<S: Scalar> fmt::Debug for ScatterPlan<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScatterPlan")
            .field("rank", &self.comm.rank())
            .field("scalar", &S::NAME)
            .field("kernels", &self.kernels)
            .field("state", &self.state)
            .field("to", &self.to)
            .field("from", &self.from)
            .field("channel", &self.channel)
            .finish()
    }
}
