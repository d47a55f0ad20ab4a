//! Iteration over the occurrences of a bag.
//!
//! Records without an identity have no place in rid order, so they are yielded first, from a
//! snapshot of the pending buffer. The rest of the bag is produced by a merge join of the change
//! overlay with a paginated stream of tree entries:
//!
//! - an overlay key below the next tree key is not in the tree and yields its change applied to 0.
//! - a tree key yields its stored multiplicity with the change under that key applied, if any.
//!   When the overlay holds the same key both cursors move past it.
//!
//! Keys whose resulting multiplicity is not positive are skipped. Each key is yielded once per
//! occurrence.
//!
//! The overlay cursor is the last key consumed rather than a position in the map, and the
//! overlay is read live. Removing through the iterator may insert into or update the overlay and
//! iteration continues after the current key regardless.

use ridbag_core::{Change, Rid};

use crate::{
    error::{Error, Result},
    prefetch::TreeEntryStream,
    record::RecordRef,
    session::Session,
    RidBag,
};

// An entry being yielded, along with the occurrences left to yield.
struct Current {
    record: RecordRef,
    remaining: u32,
}

impl Current {
    fn new(record: RecordRef, count: i32) -> Self {
        Current {
            record,
            remaining: count.max(0) as u32,
        }
    }
}

/// An iterator over every occurrence of a bag. Created with [`RidBag::iter`].
///
/// Tree reads may fail, so items are results. The iterator ends after the first error.
pub struct RidBagIter<'b, 's> {
    bag: &'b mut RidBag,
    session: &'b Session<'s>,
    pending: Vec<(RecordRef, u32)>,
    pending_pos: usize,
    overlay_cursor: Option<Rid>,
    tree: Option<TreeEntryStream>,
    current: Option<Current>,
    last: Option<RecordRef>,
    removed: bool,
    failed: bool,
}

impl<'b, 's> RidBagIter<'b, 's> {
    pub(crate) fn new(bag: &'b mut RidBag, session: &'b Session<'s>) -> Self {
        let pending = bag.pending.snapshot();
        let tree = bag
            .pointer
            .map(|pointer| TreeEntryStream::new(pointer, session.options().prefetch_size));
        RidBagIter {
            bag,
            session,
            pending,
            pending_pos: 0,
            overlay_cursor: None,
            tree,
            current: None,
            last: None,
            removed: false,
            failed: false,
        }
    }

    /// Remove the occurrence last returned by [`Iterator::next`] from the bag.
    ///
    /// Fails if `next` has not been called yet, or if the occurrence has already been removed.
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Err(Error::IteratorState("current element has already been removed"));
        }
        let record = self
            .last
            .clone()
            .ok_or(Error::IteratorState("next has not been called"))?;
        self.bag.remove_yielded(self.session, &record);
        self.removed = true;
        Ok(())
    }

    /// Restart from the first occurrence of the bag as it is now.
    pub fn reset(&mut self) {
        self.pending = self.bag.pending.snapshot();
        self.pending_pos = 0;
        self.overlay_cursor = None;
        if let Some(tree) = &mut self.tree {
            tree.reset();
        }
        self.current = None;
        self.last = None;
        self.removed = false;
        self.failed = false;
    }

    /// The size of the bag being iterated.
    pub fn size(&mut self) -> Result<u64> {
        self.bag.size(self.session)
    }

    fn advance(&mut self) -> Result<Option<Current>> {
        if let Some((record, count)) = self.pending.get(self.pending_pos) {
            let current = Current {
                record: record.clone(),
                remaining: *count,
            };
            self.pending_pos += 1;
            return Ok(Some(current));
        }

        loop {
            let overlay_next = self.bag.overlay.next_positive_after(self.overlay_cursor);
            let tree_next = match &mut self.tree {
                Some(tree) => tree.peek(self.session.collections())?,
                None => None,
            };

            match (overlay_next, tree_next) {
                (None, None) => return Ok(None),
                (Some((rid, change)), tree_next)
                    if tree_next.map_or(true, |(key, _)| rid < key) =>
                {
                    self.overlay_cursor = Some(rid);
                    return Ok(Some(Current::new(rid.into(), change.apply_to(0))));
                }
                (_, Some((key, stored))) => {
                    if let Some(tree) = &mut self.tree {
                        tree.advance();
                    }
                    self.overlay_cursor = self.overlay_cursor.max(Some(key));

                    let count = self
                        .bag
                        .overlay
                        .get(&key)
                        .map_or(stored, |change: Change| change.apply_to(stored));
                    if count > 0 {
                        return Ok(Some(Current::new(key.into(), count)));
                    }
                }
                // the guard of the overlay arm holds whenever the tree is exhausted.
                (Some(_), None) => return Ok(None),
            }
        }
    }
}

impl Iterator for RidBagIter<'_, '_> {
    type Item = Result<RecordRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(current) = &mut self.current {
                if current.remaining > 0 {
                    current.remaining -= 1;
                    let record = current.record.clone();
                    self.last = Some(record.clone());
                    self.removed = false;
                    return Some(Ok(record));
                }
                self.current = None;
            }

            match self.advance() {
                Ok(Some(current)) => self.current = Some(current),
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
