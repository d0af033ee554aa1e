use crate::types::{CombineMode, Rank};

pub type Result<T> = std::result::Result<T, ScatterError>;

/// Coarse classification of a [`ScatterError`].
///
/// Configuration errors surface at plan construction, usage errors indicate a
/// caller bug, transport errors come from the communication layer. None of
/// them are retried by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Usage,
    Transport,
}

#[derive(Debug, thiserror::Error)]
pub enum ScatterError {
    // ── Configuration ───────────────────────────────────────────────
    #[error("{argument}[{position}] = {index} is not owned by any rank (upper bound {upper})")]
    IndexOutOfRange {
        index: usize,
        argument: &'static str,
        position: usize,
        upper: usize,
    },

    #[error(
        "{argument}[{position}]: block [{start}, {end}) straddles the boundary of rank {rank}"
    )]
    BlockStraddlesPartition {
        argument: &'static str,
        position: usize,
        start: usize,
        end: usize,
        rank: Rank,
    },

    #[error("invalid block size {bs}: must be at least 1")]
    InvalidBlockSize { bs: usize },

    #[error("block size {local} disagrees with the other ranks")]
    BlockSizeMismatch { local: usize },

    #[error("combine mode {mode} is not defined for scalar type {scalar}")]
    UnsupportedCombineMode {
        mode: CombineMode,
        scalar: &'static str,
    },

    #[error("{argument}[{position}] (peer {peer}): length {length} is invalid: {reason}")]
    InvalidSegmentLength {
        argument: &'static str,
        position: usize,
        peer: Rank,
        length: i64,
        reason: String,
    },

    #[error("{argument}: peer {peer} listed more than once")]
    DuplicatePeer { argument: &'static str, peer: Rank },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: u32 },

    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    #[error("index lists differ in length: {from} source indices, {to} destination indices")]
    PairCountMismatch { from: usize, to: usize },

    // ── Usage ───────────────────────────────────────────────────────
    #[error("scatter already in flight: call end() before the next begin()")]
    AlreadyInFlight,

    #[error("end() called without a matching begin()")]
    NotInFlight,

    #[error("{array} array too short: need at least {required} scalars, got {actual}")]
    ArrayTooShort {
        array: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("scatter plan is unusable after an earlier transport failure")]
    PlanFailed,

    // ── Transport ───────────────────────────────────────────────────
    #[error("peer {rank} disconnected unexpectedly")]
    PeerDisconnected { rank: Rank },

    #[error("{operation} failed at rank {rank}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        rank: Rank,
        reason: String,
    },

    #[error("ready send to rank {dest} on tag {tag}: no receive posted")]
    ReceiverNotReady { dest: Rank, tag: u64 },

    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("received {actual} items where {expected} were announced")]
    MessageLengthMismatch { expected: usize, actual: usize },

    #[error("message decode failed: {0}")]
    DecodeFailed(String),

    #[error("message encode failed: {0}")]
    EncodeFailed(String),

    #[error("window {id} on rank {rank}: {reason}")]
    Window { id: u64, rank: Rank, reason: String },

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ScatterError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IndexOutOfRange { .. }
            | Self::BlockStraddlesPartition { .. }
            | Self::InvalidBlockSize { .. }
            | Self::BlockSizeMismatch { .. }
            | Self::UnsupportedCombineMode { .. }
            | Self::InvalidSegmentLength { .. }
            | Self::DuplicatePeer { .. }
            | Self::InvalidRank { .. }
            | Self::InvalidPartition(_)
            | Self::PairCountMismatch { .. } => ErrorKind::Configuration,

            Self::AlreadyInFlight
            | Self::NotInFlight
            | Self::ArrayTooShort { .. }
            | Self::PlanFailed => ErrorKind::Usage,

            Self::PeerDisconnected { .. }
            | Self::CollectiveFailed { .. }
            | Self::ReceiverNotReady { .. }
            | Self::BufferSizeMismatch { .. }
            | Self::MessageLengthMismatch { .. }
            | Self::DecodeFailed(_)
            | Self::EncodeFailed(_)
            | Self::Window { .. }
            | Self::LockPoisoned(_)
            | Self::Transport { .. } => ErrorKind::Transport,
        }
    }
}
