//! Pending multiplicity changes.
//!
//! A bag keeps, for every key touched in memory, a [`Change`] describing how the multiplicity
//! stored in the backing tree must be adjusted. A change is either relative to a base that has
//! not been read, or an absolute count that has already been resolved against the tree.

/// The wire tag of [`Change::Relative`].
pub const RELATIVE_TAG: u8 = 0;

/// The wire tag of [`Change::Absolute`].
pub const ABSOLUTE_TAG: u8 = 1;

/// The number of bytes a change occupies in the wire format: a tag followed by an `i32`.
pub const CHANGE_SIZE: usize = 1 + 4;

/// A multiplicity adjustment for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "borsh",
    derive(borsh::BorshDeserialize, borsh::BorshSerialize)
)]
pub enum Change {
    /// A signed delta against a stored multiplicity which is not known.
    Relative(i32),
    /// A resolved multiplicity which no longer depends on the stored one.
    Absolute(i32),
}

impl Change {
    /// Build a change from its wire tag. Returns `None` for unknown tags.
    pub fn from_tag(tag: u8, value: i32) -> Option<Self> {
        match tag {
            RELATIVE_TAG => Some(Change::Relative(value)),
            ABSOLUTE_TAG => Some(Change::Absolute(value)),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Change::Relative(_) => RELATIVE_TAG,
            Change::Absolute(_) => ABSOLUTE_TAG,
        }
    }

    /// The raw value: the delta of a relative change or the count of an absolute one.
    pub fn value(&self) -> i32 {
        match *self {
            Change::Relative(delta) => delta,
            Change::Absolute(value) => value,
        }
    }

    /// The multiplicity resulting from applying this change to the stored multiplicity `base`.
    pub fn apply_to(&self, base: i32) -> i32 {
        match *self {
            Change::Relative(delta) => base.saturating_add(delta),
            Change::Absolute(value) => value,
        }
    }

    /// Whether the result of this change depends on the stored multiplicity.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Change::Relative(_))
    }

    pub fn increment(&mut self) {
        self.apply_diff(1);
    }

    pub fn decrement(&mut self) {
        self.apply_diff(-1);
    }

    /// Fold an additional signed delta into this change, keeping its kind.
    pub fn apply_diff(&mut self, diff: i32) {
        match self {
            Change::Relative(delta) => *delta = delta.saturating_add(diff),
            Change::Absolute(value) => *value = value.saturating_add(diff),
        }
    }
}
