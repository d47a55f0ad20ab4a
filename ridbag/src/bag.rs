//! The bag façade.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use ridbag_core::{wire, Change, CollectionPointer, Rid};

use crate::{
    commit::CommitAction,
    error::{Error, InCollection, Result},
    iter::RidBagIter,
    overlay::ChangeOverlay,
    pending::PendingEntries,
    record::{same_element, RecordElement, RecordRef},
    session::Session,
    tracker::{ChangeEvent, ChangeKind, ChangeTimeLine, ChangeTracker},
    tree::TreeLease,
};

/// A multiset of records backed by a bonsai tree.
///
/// The bag never loads its tree as a whole. Additions and removals are recorded in memory: in
/// the change overlay for records which have an identity and in the pending buffer for records
/// which do not. The tree is only read when a question cannot be answered from memory, and only
/// written when the bag is serialized, either directly or through the commit queue of the
/// enclosing transaction.
pub struct RidBag {
    pub(crate) pointer: Option<CollectionPointer>,
    pub(crate) overlay: ChangeOverlay,
    pub(crate) pending: PendingEntries,
    // `None` when the size can only be known by reading the tree.
    size: Option<u64>,
    owner: Option<Weak<dyn RecordElement>>,
    tracker: ChangeTracker,
    dirty: bool,
    transaction_dirty: bool,
}

impl RidBag {
    /// Create an empty bag with no tree.
    pub fn new() -> Self {
        RidBag {
            pointer: None,
            overlay: ChangeOverlay::new(),
            pending: PendingEntries::default(),
            size: Some(0),
            owner: None,
            tracker: ChangeTracker::default(),
            dirty: false,
            transaction_dirty: false,
        }
    }

    /// Reconstruct a bag from its tree and the changes not yet applied to it.
    pub fn with_tree(pointer: CollectionPointer, changes: ChangeOverlay) -> Self {
        RidBag {
            pointer: Some(pointer),
            overlay: changes,
            size: None,
            ..RidBag::new()
        }
    }

    pub fn pointer(&self) -> Option<CollectionPointer> {
        self.pointer
    }

    pub fn set_pointer(&mut self, pointer: Option<CollectionPointer>) {
        self.pointer = pointer;
    }

    /// Add one occurrence of `record`.
    pub fn add(&mut self, session: &Session, record: &RecordRef) {
        let rid = self.refresh_rid(session, record.rid());
        if rid.is_valid() {
            let previous = self.overlay.get(&rid);
            self.overlay.apply_diff(rid, 1);
            // a negative change may hide whether the new occurrence is visible.
            self.size = match previous {
                Some(Change::Relative(delta)) if delta < 0 => None,
                Some(Change::Absolute(value)) if value < 0 => self.size,
                _ => self.size.map(|size| size + 1),
            };
        } else {
            self.pending.increment(record);
            self.size = self.size.map(|size| size + 1);
        }

        self.notify(ChangeKind::Add, record);
    }

    pub fn add_all<'r>(
        &mut self,
        session: &Session,
        records: impl IntoIterator<Item = &'r RecordRef>,
    ) {
        for record in records {
            self.add(session, record);
        }
    }

    /// Remove one occurrence of `record`.
    ///
    /// Removing a stored record the bag knows nothing about in memory is recorded as a pending
    /// decrement of the tree, after which the size of the bag is unknown. Removing a record which
    /// is neither known nor stored does nothing.
    pub fn remove(&mut self, session: &Session, record: &RecordRef) {
        let rid = self.refresh_rid(session, record.rid());
        if !self.remove_occurrence(record, rid, false) {
            return;
        }
        self.notify(ChangeKind::Remove, record);
    }

    /// Remove an occurrence yielded by an iterator over this bag.
    pub(crate) fn remove_yielded(&mut self, session: &Session, record: &RecordRef) {
        let rid = self.refresh_rid(session, record.rid());
        self.remove_occurrence(record, rid, true);
        self.notify(ChangeKind::Remove, record);
    }

    // Returns `false` if there was nothing to remove.
    fn remove_occurrence(&mut self, record: &RecordRef, rid: Rid, yielded: bool) -> bool {
        if self.pending.decrement(record) {
            self.size = self.size.map(|size| size.saturating_sub(1));
            return true;
        }

        let previous = self.overlay.get(&rid);
        match previous {
            None if yielded || rid.is_persistent() => {
                self.overlay.insert(rid, Change::Relative(-1));
                self.size = None;
            }
            None => return false,
            Some(_) => {
                let change = self.overlay.decrement(&rid);
                self.size = match (self.size, change, previous) {
                    (_, Some(Change::Relative(_)), _) => None,
                    (Some(size), _, Some(Change::Absolute(value))) if value <= 0 => Some(size),
                    (size, _, _) => size.map(|size| size.saturating_sub(1)),
                };
            }
        }
        true
    }

    /// Whether at least one occurrence of `record` is in the bag.
    ///
    /// Answering may require reading the stored multiplicity from the tree, in which case the
    /// resolved multiplicity is cached in the overlay as an absolute change.
    pub fn contains(&mut self, session: &Session, record: &RecordRef) -> Result<bool> {
        if self.pending.contains(record) {
            return Ok(true);
        }

        let rid = self.refresh_rid(session, record.rid());
        if !rid.is_valid() {
            return Ok(false);
        }

        let change = self.overlay.get(&rid);
        if let Some(Change::Absolute(value)) = change {
            return Ok(value > 0);
        }

        let pointer = match self.pointer {
            Some(pointer) if rid.is_persistent() => pointer,
            _ => {
                let value = change.map_or(0, |change| change.apply_to(0));
                if change.is_some() {
                    self.overlay.insert(rid, Change::Absolute(value));
                }
                return Ok(value > 0);
            }
        };

        let tree = TreeLease::acquire(session.collections(), pointer)?;
        let stored = tree.get(&rid).in_collection(pointer)?.unwrap_or(0);
        let value = change.map_or(stored, |change| change.apply_to(stored));
        self.overlay.insert(rid, Change::Absolute(value));
        drop(tree);

        Ok(value > 0)
    }

    /// The number of occurrences in the bag.
    pub fn size(&mut self, session: &Session) -> Result<u64> {
        if let Some(size) = self.size {
            return Ok(size);
        }

        let stored = match self.pointer {
            Some(pointer) => {
                let tree = TreeLease::acquire(session.collections(), pointer)?;
                tree.real_bag_size(&self.overlay).in_collection(pointer)?
            }
            None => self.overlay.detached_size(),
        };
        let size = stored + self.pending.total();

        tracing::debug!(size, "recomputed rid bag size");
        self.size = Some(size);
        Ok(size)
    }

    /// Set the size of the bag, for collaborators which know it.
    pub fn set_size(&mut self, size: Option<u64>) {
        self.size = size;
    }

    pub fn is_empty(&mut self, session: &Session) -> Result<bool> {
        Ok(self.size(session)? == 0)
    }

    /// Iterate every occurrence in the bag: records without an identity first, then stored and
    /// changed records in rid order.
    pub fn iter<'b, 's>(&'b mut self, session: &'b Session<'s>) -> RidBagIter<'b, 's> {
        RidBagIter::new(self, session)
    }

    /// Collect every occurrence in iteration order.
    pub fn to_vec(&mut self, session: &Session) -> Result<Vec<RecordRef>> {
        self.iter(session).collect()
    }

    /// Fold the changes made to `other` into this bag.
    ///
    /// `other` is a copy of this bag modified concurrently. Its relative changes are replayed as
    /// they are. Its absolute changes are replayed as the difference between the multiplicity
    /// they set and the multiplicity this bag currently holds.
    pub fn merge_changes(&mut self, session: &Session, other: &RidBag) -> Result<()> {
        for (record, count) in other.pending.iter() {
            self.replay_diff(session, record, count as i32);
        }

        for (rid, change) in other.overlay.iter() {
            let diff = match change {
                Change::Relative(delta) => delta,
                Change::Absolute(value) => value - self.absolute_value(session, rid)?,
            };
            self.replay_diff(session, &RecordRef::new(rid), diff);
        }
        Ok(())
    }

    fn replay_diff(&mut self, session: &Session, record: &RecordRef, diff: i32) {
        for _ in 0..diff.max(0) {
            self.add(session, record);
        }
        for _ in diff.min(0)..0 {
            self.remove(session, record);
        }
    }

    // The multiplicity of `rid` with the overlay applied to the tree.
    fn absolute_value(&mut self, session: &Session, rid: Rid) -> Result<i32> {
        let rid = self.refresh_rid(session, rid);
        let change = self.overlay.get(&rid);
        if let Some(Change::Absolute(value)) = change {
            return Ok(value);
        }

        let stored = match self.pointer {
            Some(pointer) if rid.is_persistent() => {
                let tree = TreeLease::acquire(session.collections(), pointer)?;
                tree.get(&rid).in_collection(pointer)?.unwrap_or(0)
            }
            _ => 0,
        };
        Ok(change.map_or(stored, |change| change.apply_to(stored)))
    }

    /// Move the records of the pending buffer into the overlay.
    ///
    /// Every pending record must have been assigned an identity by now.
    pub fn apply_new_entries(&mut self) -> Result<()> {
        if self.pending.iter().any(|(record, _)| !record.rid().is_valid()) {
            return Err(Error::UnresolvedIdentity);
        }
        for (record, count) in self.pending.drain() {
            self.overlay.apply_diff(record.rid(), count as i32);
        }
        Ok(())
    }

    /// The changes not yet applied to the tree, once the pending buffer has been moved into them.
    pub fn changes(&mut self) -> Result<&ChangeOverlay> {
        self.apply_new_entries()?;
        Ok(&self.overlay)
    }

    /// Forget the overlay once its changes have been applied to the tree.
    pub fn clear_changes(&mut self) {
        self.overlay.clear();
    }

    // The rid the transaction now knows `rid` by. A change recorded under the old rid moves
    // with it.
    fn refresh_rid(&mut self, session: &Session, rid: Rid) -> Rid {
        let refreshed = session.refresh_rid(rid);
        if refreshed != rid {
            self.overlay.rekey(&rid, refreshed);
        }
        refreshed
    }

    // Re-key temporary rids the transaction has since assigned persistent rids to.
    fn refresh_temporary_rids(&mut self, session: &Session) {
        let temporary: Vec<Rid> = self
            .overlay
            .iter()
            .map(|(rid, _)| rid)
            .filter(Rid::is_temporary)
            .collect();
        for rid in temporary {
            let refreshed = session.refresh_rid(rid);
            if refreshed != rid {
                self.overlay.rekey(&rid, refreshed);
            }
        }
    }

    /// Write the bag to `buf`, returning the number of bytes written.
    ///
    /// Within a local transaction the changes are handed to the transaction's commit queue,
    /// allocating the tree first if the bag has none, and only the tree pointer is written.
    /// Otherwise the changes are written inline after the pointer.
    pub fn serialize(
        &mut self,
        session: &Session,
        buf: &mut Vec<u8>,
        owner_id: Option<u128>,
    ) -> Result<usize> {
        if session.transaction().is_none() {
            return Err(Error::NotInTransaction);
        }
        self.apply_new_entries()?;

        let legacy_size = self
            .size
            .map_or(-1, |size| i32::try_from(size).unwrap_or(i32::MAX));

        let Some(queue) = session.deferred() else {
            return Ok(wire::encode(
                self.pointer.as_ref(),
                legacy_size,
                self.overlay.iter(),
                buf,
            ));
        };

        let pointer = match self.pointer {
            Some(pointer) => pointer,
            None => {
                let cluster_id = self.owner_cluster().ok_or(Error::MissingOwnerCluster)?;
                let pointer = session
                    .collections()
                    .create_tree(cluster_id, queue.atomic_operation(), owner_id)
                    .map_err(|source| Error::TreeCreation { cluster_id, source })?;
                tracing::debug!(collection = %pointer, cluster_id, "allocated rid bag tree");
                self.pointer = Some(pointer);
                pointer
            }
        };

        self.refresh_temporary_rids(session);
        queue.push(CommitAction::UpdateTree {
            pointer,
            changes: self.overlay.clone(),
        });
        tracing::debug!(
            collection = %pointer,
            changes = self.overlay.len(),
            "deferred rid bag tree update"
        );

        Ok(wire::encode(Some(&pointer), legacy_size, std::iter::empty(), buf))
    }

    /// The number of bytes [`RidBag::serialize`] would write in the given session.
    pub fn serialized_size(&self, session: &Session) -> usize {
        if session.deferred().is_some() {
            return wire::HEADER_SIZE;
        }
        let mut keys: Vec<Rid> = self.overlay.iter().map(|(rid, _)| rid).collect();
        keys.extend(self.pending.iter().map(|(record, _)| record.rid()));
        keys.sort_unstable();
        keys.dedup();
        wire::HEADER_SIZE + wire::changes_size(keys.len())
    }

    /// Read a bag written by [`RidBag::serialize`] from the front of `bytes`.
    ///
    /// Returns the bag and the number of bytes consumed. The size of the bag is unknown until it
    /// is recomputed.
    pub fn deserialize(bytes: &[u8]) -> Result<(RidBag, usize)> {
        let (decoded, read) = wire::decode(bytes)?;
        let bag = RidBag {
            pointer: decoded.pointer,
            overlay: decoded.changes.into_iter().collect(),
            size: None,
            ..RidBag::new()
        };
        Ok((bag, read))
    }

    /// Ask for the tree of the bag to be destroyed when the transaction commits.
    ///
    /// Does nothing if the bag has no tree or the session has no commit queue.
    pub fn request_delete(&self, session: &Session) {
        if let (Some(queue), Some(pointer)) = (session.deferred(), self.pointer) {
            queue.push(CommitAction::DeleteTree { pointer });
            tracing::debug!(collection = %pointer, "requested rid bag tree deletion");
        }
    }

    /// Called once the tree of the bag has been destroyed. Leaves the bag empty.
    pub fn confirm_delete(&mut self) {
        self.pointer = None;
        self.overlay.clear();
        self.pending.clear();
        self.size = Some(0);
    }

    pub fn owner(&self) -> Option<Arc<dyn RecordElement>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    /// Attach the bag to the record embedding it, or detach it with `None`.
    ///
    /// A bag belongs to a single record. Attaching it to another record while the current owner
    /// is alive fails with [`Error::OwnerConflict`]. The records changed in memory are untracked
    /// from the previous owner and tracked by the new one. The tree is not read.
    pub fn set_owner(&mut self, owner: Option<Arc<dyn RecordElement>>) -> Result<()> {
        let current = self.owner();
        if let (Some(new), Some(current)) = (&owner, &current) {
            if !same_element(new, current) {
                return Err(Error::OwnerConflict);
            }
        }
        if current.is_none() && self.owner.is_some() {
            tracing::warn!("rid bag owner was dropped before the bag was re-attached");
        }

        if current.is_none() && owner.is_none() {
            self.owner = None;
            return Ok(());
        }

        let records: Vec<RecordRef> = self
            .pending
            .iter()
            .map(|(record, _)| record.clone())
            .chain(self.overlay.iter().map(|(rid, _)| RecordRef::new(rid)))
            .collect();
        if let Some(current) = &current {
            for record in &records {
                current.untrack(record);
            }
        }
        self.owner = owner.as_ref().map(Arc::downgrade);
        if let Some(owner) = &owner {
            for record in &records {
                owner.track(record);
            }
        }
        Ok(())
    }

    // The cluster of the top-most stored record in the owner chain. Trees of embedded bags are
    // allocated next to the top-level record rather than next to the embedded one.
    fn owner_cluster(&self) -> Option<i16> {
        let mut element = self.owner();
        let mut cluster_id = None;
        while let Some(current) = element {
            cluster_id = current.cluster_id().or(cluster_id);
            element = current.owner();
        }
        cluster_id
    }

    fn notify(&mut self, kind: ChangeKind, record: &RecordRef) {
        self.tracker.record(kind, record);
        self.dirty = true;
        self.transaction_dirty = true;

        match self.owner() {
            Some(owner) => {
                match kind {
                    ChangeKind::Add => owner.track(record),
                    ChangeKind::Remove => owner.untrack(record),
                }
                owner.set_dirty();
            }
            None if self.owner.is_some() => {
                tracing::warn!(record = ?record, "rid bag changed after its owner was dropped");
            }
            None => {}
        }
    }

    /// Mark the bag and its owner as modified.
    pub fn set_dirty(&mut self) {
        self.dirty = true;
        self.transaction_dirty = true;
        if let Some(owner) = self.owner() {
            owner.set_dirty();
        }
    }

    /// Ask for the owner to be saved without counting it as modified.
    pub fn set_dirty_no_changed(&self) {
        if let Some(owner) = self.owner() {
            owner.set_dirty_no_changed();
        }
    }

    pub fn is_modified(&self) -> bool {
        self.dirty
    }

    pub fn is_transaction_modified(&self) -> bool {
        self.transaction_dirty
    }

    pub fn set_transaction_modified(&mut self, modified: bool) {
        self.transaction_dirty = modified;
    }

    /// Start recording additions and removals on the change timelines.
    pub fn enable_tracking(&mut self) {
        self.tracker.enable();
    }

    /// Stop recording and forget the timelines. The bag no longer counts as modified.
    pub fn disable_tracking(&mut self) {
        self.tracker.disable();
        self.dirty = false;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_enabled()
    }

    /// Forget the changes made within the current transaction.
    pub fn transaction_clear(&mut self) {
        self.tracker.transaction_clear();
        self.transaction_dirty = false;
    }

    pub fn timeline(&self) -> Option<&ChangeTimeLine> {
        self.tracker.timeline()
    }

    pub fn transaction_timeline(&self) -> Option<&ChangeTimeLine> {
        self.tracker.transaction_timeline()
    }

    /// A new bag holding the contents this bag had before `events` happened.
    pub fn return_original_state(
        &mut self,
        session: &Session,
        events: &[ChangeEvent],
    ) -> Result<RidBag> {
        let mut reverted = RidBag::new();
        for record in self.to_vec(session)? {
            reverted.add(session, &record);
        }
        for event in events.iter().rev() {
            match event.kind {
                ChangeKind::Add => reverted.remove(session, &event.value),
                ChangeKind::Remove => reverted.add(session, &event.value),
            }
        }
        Ok(reverted)
    }
}

impl Default for RidBag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RidBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(size) => write!(f, "[size={size}]"),
            None => f.write_str("[...]"),
        }
    }
}

impl fmt::Debug for RidBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RidBag")
            .field("pointer", &self.pointer)
            .field("overlay", &self.overlay)
            .field("pending", &self.pending.len())
            .field("size", &self.size)
            .finish()
    }
}
