/// Rank of a participant in a communicator (0-indexed).
pub type Rank = u32;

/// How an incoming value is written into an existing destination slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombineMode {
    /// Replace the destination value.
    Overwrite,
    /// Add the incoming value to the destination value.
    Add,
    /// Keep the larger of the two. Only defined for ordered scalars.
    Max,
    /// Leave the destination untouched. Sends still run.
    Ignore,
}

impl std::fmt::Display for CombineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombineMode::Overwrite => f.write_str("overwrite"),
            CombineMode::Add => f.write_str("add"),
            CombineMode::Max => f.write_str("max"),
            CombineMode::Ignore => f.write_str("ignore"),
        }
    }
}

/// Which way a scatter plan moves data.
///
/// `Reverse` swaps the roles of the send and receive structures, so values
/// flow from the destination layout back to the source layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScatterDirection {
    Forward,
    Reverse,
}

impl std::fmt::Display for ScatterDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScatterDirection::Forward => f.write_str("forward"),
            ScatterDirection::Reverse => f.write_str("reverse"),
        }
    }
}

/// Communication strategy a scatter plan binds to at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    /// Persistent per-peer sends and receives.
    #[default]
    PointToPoint,
    /// Receives are posted (and synchronised on) before any send is issued.
    ReadyReceiver,
    /// One collective all-to-all(v) exchange per scatter.
    AllToAllV,
    /// One-sided puts into peers' exposed memory windows.
    Window,
}

impl TransportKind {
    pub const fn name(self) -> &'static str {
        match self {
            TransportKind::PointToPoint => "point-to-point",
            TransportKind::ReadyReceiver => "ready-receiver",
            TransportKind::AllToAllV => "alltoallv",
            TransportKind::Window => "window",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "point-to-point" | "p2p" | "ptp" => Ok(TransportKind::PointToPoint),
            "ready-receiver" | "rsend" => Ok(TransportKind::ReadyReceiver),
            "alltoallv" | "alltoall" => Ok(TransportKind::AllToAllV),
            "window" | "rma" => Ok(TransportKind::Window),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}
