//! Records added to a bag before they have an identity.
//!
//! Such records cannot be ordered or stored in the tree, so they are counted by handle: two
//! handles to distinct record objects stay separate entries even when their contents are equal,
//! as they may be saved under different rids.

use std::hash::{Hash, Hasher};

use fxhash::FxHashMap;

use crate::record::RecordRef;

// Hashes and compares a record by the address of its handle.
#[derive(Clone)]
struct ByHandle(RecordRef);

impl PartialEq for ByHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl Eq for ByHandle {}

impl Hash for ByHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.address().hash(state)
    }
}

#[derive(Default, Clone)]
pub(crate) struct PendingEntries {
    counters: FxHashMap<ByHandle, u32>,
}

impl PendingEntries {
    pub(crate) fn increment(&mut self, record: &RecordRef) {
        *self.counters.entry(ByHandle(record.clone())).or_insert(0) += 1;
    }

    /// Decrement the counter of the record, dropping the entry once it reaches zero.
    ///
    /// Returns `false` if the record had no entry.
    pub(crate) fn decrement(&mut self, record: &RecordRef) -> bool {
        let key = ByHandle(record.clone());
        match self.counters.get_mut(&key) {
            None => false,
            Some(counter) if *counter <= 1 => {
                self.counters.remove(&key);
                true
            }
            Some(counter) => {
                *counter -= 1;
                true
            }
        }
    }

    pub(crate) fn contains(&self, record: &RecordRef) -> bool {
        self.counters.contains_key(&ByHandle(record.clone()))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&RecordRef, u32)> {
        self.counters.iter().map(|(k, v)| (&k.0, *v))
    }

    /// A copy of the entries, detached from later mutations.
    pub(crate) fn snapshot(&self) -> Vec<(RecordRef, u32)> {
        self.iter().map(|(r, n)| (r.clone(), n)).collect()
    }

    /// Remove and return all entries.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (RecordRef, u32)> + '_ {
        self.counters.drain().map(|(k, v)| (k.0, v))
    }

    /// The number of occurrences over all entries.
    pub(crate) fn total(&self) -> u64 {
        self.counters.values().map(|&n| n as u64).sum()
    }

    pub(crate) fn len(&self) -> usize {
        self.counters.len()
    }

    pub(crate) fn clear(&mut self) {
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_records_are_tracked_separately() {
        let a = RecordRef::unsaved();
        let b = RecordRef::unsaved();

        let mut pending = PendingEntries::default();
        pending.increment(&a);
        pending.increment(&b);
        pending.increment(&a.clone());

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.total(), 3);

        let mut counts: Vec<u32> = pending.iter().map(|(_, n)| n).collect();
        counts.sort();
        assert_eq!(counts, [1, 2]);
        assert!(pending.decrement(&b));
        assert!(!pending.contains(&b));
        assert!(pending.contains(&a));
    }

    #[test]
    fn decrement_evicts_at_zero() {
        let a = RecordRef::unsaved();
        let mut pending = PendingEntries::default();
        pending.increment(&a);
        pending.increment(&a);

        assert!(pending.decrement(&a));
        assert!(pending.contains(&a));
        assert!(pending.decrement(&a));
        assert!(!pending.contains(&a));
        assert!(!pending.decrement(&a));
        assert_eq!(pending.len(), 0);
    }
}
