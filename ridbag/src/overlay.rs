//! The in-memory change log of a bag.
//!
//! The overlay maps every rid touched in memory to the [`Change`] to apply on top of the tree.
//! It is kept ordered so it can be merged with the tree in a single pass. The map is persistent:
//! cloning it is O(1) and clones share structure, which lets a commit operation capture the
//! changes of a bag while the bag keeps being mutated.

use std::ops::Bound;

use imbl::OrdMap;
use ridbag_core::{Change, Rid};

/// Pending changes ordered by rid.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ChangeOverlay {
    changes: OrdMap<Rid, Change>,
}

impl ChangeOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, rid: &Rid) -> Option<Change> {
        self.changes.get(rid).copied()
    }

    pub fn insert(&mut self, rid: Rid, change: Change) -> Option<Change> {
        self.changes.insert(rid, change)
    }

    pub fn remove(&mut self, rid: &Rid) -> Option<Change> {
        self.changes.remove(rid)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Iterate all changes in ascending rid order.
    pub fn iter(&self) -> impl Iterator<Item = (Rid, Change)> + '_ {
        self.changes.iter().map(|(rid, change)| (*rid, *change))
    }

    /// The first change after `after` (or the first change at all) which, applied on its own,
    /// yields a positive multiplicity.
    pub(crate) fn next_positive_after(&self, after: Option<Rid>) -> Option<(Rid, Change)> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.changes
            .range((lower, Bound::Unbounded))
            .map(|(rid, change)| (*rid, *change))
            .find(|(_, change)| change.apply_to(0) > 0)
    }

    /// Fold a delta into the change of `rid`, creating a relative change if there is none.
    ///
    /// Returns the updated change.
    pub(crate) fn apply_diff(&mut self, rid: Rid, diff: i32) -> Change {
        match self.changes.get_mut(&rid) {
            Some(change) => {
                change.apply_diff(diff);
                *change
            }
            None => {
                let change = Change::Relative(diff);
                self.changes.insert(rid, change);
                change
            }
        }
    }

    /// Decrement an existing change. Returns `None` if `rid` has no change.
    pub(crate) fn decrement(&mut self, rid: &Rid) -> Option<Change> {
        self.changes.get_mut(rid).map(|change| {
            change.decrement();
            *change
        })
    }

    /// The number of occurrences the overlay yields when there is no tree beneath it.
    pub(crate) fn detached_size(&self) -> u64 {
        self.changes
            .values()
            .map(|change| change.apply_to(0).max(0) as u64)
            .sum()
    }

    /// Move the change stored under `from` to `to`, merging into an existing change there.
    pub(crate) fn rekey(&mut self, from: &Rid, to: Rid) {
        if let Some(change) = self.changes.remove(from) {
            match self.changes.get_mut(&to) {
                Some(existing) => existing.apply_diff(change.value()),
                None => {
                    self.changes.insert(to, change);
                }
            }
        }
    }
}

impl FromIterator<(Rid, Change)> for ChangeOverlay {
    fn from_iter<I: IntoIterator<Item = (Rid, Change)>>(iter: I) -> Self {
        ChangeOverlay {
            changes: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Debug for ChangeOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.changes.iter()).finish()
    }
}
