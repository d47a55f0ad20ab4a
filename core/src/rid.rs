//! Record identifiers.
//!
//! A [`Rid`] names a stored record by the cluster it lives in and its position within that
//! cluster. Rids are totally ordered, cluster first, which is the order entries are kept in by
//! the backing tree.

use core::fmt;

/// The cluster id of a record which has not been assigned to any cluster.
pub const CLUSTER_ID_INVALID: i16 = -1;

/// The cluster position of a record which has no identity at all.
pub const CLUSTER_POS_INVALID: i64 = -1;

/// The number of bytes a rid occupies in the wire format.
pub const RID_SIZE: usize = 2 + 8;

/// A record identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub struct Rid {
    /// The cluster holding the record.
    pub cluster: i16,
    /// The position of the record within its cluster.
    ///
    /// Negative positions below [`CLUSTER_POS_INVALID`] denote temporary identities handed out
    /// to records created within a transaction which has not yet committed.
    pub position: i64,
}

impl Rid {
    /// The identity of a record which has never been saved.
    pub const INVALID: Rid = Rid {
        cluster: CLUSTER_ID_INVALID,
        position: CLUSTER_POS_INVALID,
    };

    pub const fn new(cluster: i16, position: i64) -> Self {
        Rid { cluster, position }
    }

    /// Whether the rid identifies a record at all, either persistently or temporarily.
    pub fn is_valid(&self) -> bool {
        self.position != CLUSTER_POS_INVALID
    }

    /// Whether the rid refers to a record which has been stored.
    pub fn is_persistent(&self) -> bool {
        self.cluster > CLUSTER_ID_INVALID && self.position > CLUSTER_POS_INVALID
    }

    /// Whether the rid is a temporary identity assigned within an uncommitted transaction.
    pub fn is_temporary(&self) -> bool {
        self.is_valid() && !self.is_persistent()
    }

    /// Append the big-endian encoding of this rid to the buffer.
    pub fn encode_into(&self, buf: &mut alloc::vec::Vec<u8>) {
        buf.extend_from_slice(&self.cluster.to_be_bytes());
        buf.extend_from_slice(&self.position.to_be_bytes());
    }

    /// Decode a rid from exactly [`RID_SIZE`] bytes.
    pub fn decode(bytes: &[u8; RID_SIZE]) -> Self {
        let mut cluster = [0; 2];
        let mut position = [0; 8];
        cluster.copy_from_slice(&bytes[..2]);
        position.copy_from_slice(&bytes[2..]);
        Rid {
            cluster: i16::from_be_bytes(cluster),
            position: i64::from_be_bytes(position),
        }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster, self.position)
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
