//! A paginated stream over the entries of a bag tree.
//!
//! Entries are pulled from the tree in batches of bounded size, so iterating a bag never holds
//! more than one batch of tree entries in memory. The tree is leased only for the duration of a
//! refill.

use std::collections::VecDeque;

use ridbag_core::{CollectionPointer, Rid};

use crate::{
    error::{InCollection, Result},
    tree::{CollectionManager, TreeLease},
};

pub(crate) struct TreeEntryStream {
    pointer: CollectionPointer,
    batch_size: usize,
    buffer: VecDeque<(Rid, i32)>,
    // the last key fetched. the next batch starts right after it.
    resume: Option<Rid>,
    exhausted: bool,
}

impl TreeEntryStream {
    pub(crate) fn new(pointer: CollectionPointer, batch_size: usize) -> Self {
        TreeEntryStream {
            pointer,
            batch_size: batch_size.max(1),
            buffer: VecDeque::with_capacity(batch_size.max(1)),
            resume: None,
            exhausted: false,
        }
    }

    /// The next entry of the tree, without consuming it. Refills the buffer when it runs dry.
    pub(crate) fn peek(&mut self, manager: &dyn CollectionManager) -> Result<Option<(Rid, i32)>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.refill(manager)?;
        }
        Ok(self.buffer.front().copied())
    }

    pub(crate) fn advance(&mut self) {
        self.buffer.pop_front();
    }

    /// Rewind to the first entry of the tree.
    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
        self.resume = None;
        self.exhausted = false;
    }

    fn refill(&mut self, manager: &dyn CollectionManager) -> Result<()> {
        let pointer = self.pointer;
        let tree = TreeLease::acquire(manager, pointer)?;

        let (from, inclusive) = match self.resume {
            Some(last) => (last, false),
            None => match tree.first_key().in_collection(pointer)? {
                Some(first) => (first, true),
                None => {
                    self.exhausted = true;
                    return Ok(());
                }
            },
        };

        let batch_size = self.batch_size;
        let buffer = &mut self.buffer;
        let completed = tree
            .load_entries_major(&from, inclusive, true, &mut |key, value| {
                buffer.push_back((key, value));
                buffer.len() < batch_size
            })
            .in_collection(pointer)?;

        if let Some(&(last, _)) = self.buffer.back() {
            self.resume = Some(last);
        }
        if completed {
            self.exhausted = true;
        }

        tracing::trace!(
            collection = %pointer,
            fetched = self.buffer.len(),
            exhausted = self.exhausted,
            "prefetched tree entries"
        );
        Ok(())
    }
}
