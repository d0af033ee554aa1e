use crate::types::Rank;

/// Control messages exchanged while a scatter plan is being built, and by the
/// barrier used for transport synchronisation.
///
/// Scalar payloads do NOT flow through this enum. Packed values are sent as
/// raw little-endian bytes so the per-call path never touches rkyv.
#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize, Debug, Clone, PartialEq)]
pub enum PlanMessage {
    /// Number of items the sender is about to ship on the paired tag.
    Length { count: u64 },

    /// Index pairs routed to the owner of their source entries.
    ///
    /// The three vectors are parallel: pair `i` moves the block at local
    /// source offset `src_offsets[i]` (on the receiving rank) to local
    /// offset `dst_offsets[i]` on rank `dst_owners[i]`.
    Pairs {
        src_offsets: Vec<u64>,
        dst_owners: Vec<Rank>,
        dst_offsets: Vec<u64>,
    },

    /// Destination write offsets, in the order the sender will pack values.
    Offsets { offsets: Vec<u64> },

    /// Byte offset into the receiver's exposed window where the sender
    /// writes its segment.
    WindowOffset { offset: u64 },

    /// Barrier token: all ranks must reach this epoch before proceeding.
    Barrier { epoch: u64 },
}

impl PlanMessage {
    /// Variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Length { .. } => "Length",
            Self::Pairs { .. } => "Pairs",
            Self::Offsets { .. } => "Offsets",
            Self::WindowOffset { .. } => "WindowOffset",
            Self::Barrier { .. } => "Barrier",
        }
    }
}
