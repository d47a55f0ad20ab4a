//! In-memory implementations of the bag collaborators.
//!
//! These keep every tree in a `BTreeMap` and are meant for tests and for embedders which keep
//! bags without durable storage. The collection manager counts outstanding leases so callers can
//! check that every lease taken has been returned.

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::bail;
use dashmap::DashMap;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use ridbag_core::{BucketPointer, CollectionPointer, Rid};

use crate::{
    commit::CommitQueue,
    record::{RecordElement, RecordRef},
    session::Transaction,
    tree::{AtomicOperationId, BonsaiTree, CollectionManager},
};

/// A bag tree held in memory.
pub struct MemoryTree {
    cluster_id: i16,
    entries: Mutex<BTreeMap<Rid, i32>>,
}

impl MemoryTree {
    fn new(cluster_id: i16) -> Self {
        MemoryTree {
            cluster_id,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// The cluster the tree was created for.
    pub fn cluster_id(&self) -> i16 {
        self.cluster_id
    }

    /// All entries in ascending key order.
    pub fn entries(&self) -> Vec<(Rid, i32)> {
        self.entries.lock().iter().map(|(k, v)| (*k, *v)).collect()
    }
}

impl BonsaiTree for MemoryTree {
    fn get(&self, key: &Rid) -> anyhow::Result<Option<i32>> {
        Ok(self.entries.lock().get(key).copied())
    }

    fn put(&self, key: Rid, value: i32) -> anyhow::Result<()> {
        self.entries.lock().insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &Rid) -> anyhow::Result<Option<i32>> {
        Ok(self.entries.lock().remove(key))
    }

    fn first_key(&self) -> anyhow::Result<Option<Rid>> {
        Ok(self.entries.lock().keys().next().copied())
    }

    fn load_entries_major(
        &self,
        from: &Rid,
        inclusive: bool,
        ascending: bool,
        visitor: &mut dyn FnMut(Rid, i32) -> bool,
    ) -> anyhow::Result<bool> {
        let entries = self.entries.lock();
        let bound = if inclusive {
            Bound::Included(*from)
        } else {
            Bound::Excluded(*from)
        };

        let mut visit = |(key, value): (&Rid, &i32)| visitor(*key, *value);
        let completed = if ascending {
            entries.range((bound, Bound::Unbounded)).all(&mut visit)
        } else {
            entries.range((Bound::Unbounded, bound)).rev().all(&mut visit)
        };
        Ok(completed)
    }
}

/// A collection manager keeping trees in memory.
#[derive(Default)]
pub struct MemoryCollectionManager {
    trees: DashMap<i64, Arc<MemoryTree>>,
    next_file_id: AtomicI64,
    leases: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryCollectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree holding the given entries, outside of any atomic operation.
    pub fn insert_tree(&self, entries: impl IntoIterator<Item = (Rid, i32)>) -> CollectionPointer {
        let tree = MemoryTree::new(0);
        tree.entries.lock().extend(entries);
        self.register(tree)
    }

    pub fn tree(&self, pointer: &CollectionPointer) -> Option<Arc<MemoryTree>> {
        self.trees.get(&pointer.file_id).map(|tree| tree.value().clone())
    }

    /// The entries of the tree at `pointer`, `None` if there is no such tree.
    pub fn tree_entries(&self, pointer: &CollectionPointer) -> Option<Vec<(Rid, i32)>> {
        self.tree(pointer).map(|tree| tree.entries())
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// The number of leases taken and not yet released.
    pub fn outstanding_leases(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    /// Make every subsequent storage call fail, simulating an I/O error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_failing(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("simulated storage failure");
        }
        Ok(())
    }

    fn register(&self, tree: MemoryTree) -> CollectionPointer {
        let file_id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        self.trees.insert(file_id, Arc::new(tree));
        CollectionPointer::new(file_id, BucketPointer::new(0, 0))
    }
}

impl CollectionManager for MemoryCollectionManager {
    fn load_tree(
        &self,
        pointer: &CollectionPointer,
    ) -> anyhow::Result<Option<Arc<dyn BonsaiTree>>> {
        self.check_failing()?;
        Ok(self.tree(pointer).map(|tree| {
            self.leases.fetch_add(1, Ordering::SeqCst);
            tree as Arc<dyn BonsaiTree>
        }))
    }

    fn release_tree(&self, _pointer: &CollectionPointer) {
        self.leases.fetch_sub(1, Ordering::SeqCst);
    }

    fn create_tree(
        &self,
        cluster_id: i16,
        _atomic_operation: AtomicOperationId,
        _owner_id: Option<u128>,
    ) -> anyhow::Result<CollectionPointer> {
        self.check_failing()?;
        Ok(self.register(MemoryTree::new(cluster_id)))
    }

    fn delete_tree(&self, pointer: &CollectionPointer) -> anyhow::Result<()> {
        self.check_failing()?;
        if self.trees.remove(&pointer.file_id).is_none() {
            bail!("no tree at {pointer}");
        }
        Ok(())
    }
}

/// A transaction assigning persistent rids from a map.
pub struct MemoryTransaction {
    deferred: Option<CommitQueue>,
    rids: Mutex<FxHashMap<Rid, Rid>>,
}

impl MemoryTransaction {
    /// A local transaction running inside the given atomic operation. Bags serialized within it
    /// defer their changes to its commit queue.
    pub fn local(atomic_operation: AtomicOperationId) -> Self {
        MemoryTransaction {
            deferred: Some(CommitQueue::new(atomic_operation)),
            rids: Mutex::new(FxHashMap::default()),
        }
    }

    /// A transaction without a commit queue. Bags serialized within it are written inline.
    pub fn without_deferred() -> Self {
        MemoryTransaction {
            deferred: None,
            rids: Mutex::new(FxHashMap::default()),
        }
    }

    /// Assign the persistent rid `persistent` to the record known by `temporary`.
    pub fn map_rid(&self, temporary: Rid, persistent: Rid) {
        self.rids.lock().insert(temporary, persistent);
    }

    pub fn queue(&self) -> Option<&CommitQueue> {
        self.deferred.as_ref()
    }
}

impl Transaction for MemoryTransaction {
    fn deferred(&self) -> Option<&CommitQueue> {
        self.deferred.as_ref()
    }

    fn refresh_rid(&self, rid: &Rid) -> Option<Rid> {
        self.rids.lock().get(rid).copied()
    }
}

/// A record element which counts the notifications it receives.
#[derive(Default)]
pub struct MemoryElement {
    cluster_id: Option<i16>,
    parent: Option<Arc<dyn RecordElement>>,
    dirty: AtomicUsize,
    dirty_no_changed: AtomicUsize,
    tracked: Mutex<Vec<Rid>>,
}

impl MemoryElement {
    /// A stored record in the given cluster.
    pub fn in_cluster(cluster_id: i16) -> Self {
        MemoryElement {
            cluster_id: Some(cluster_id),
            ..Default::default()
        }
    }

    /// An element embedded in `parent`, with no cluster of its own.
    pub fn embedded_in(parent: Arc<dyn RecordElement>) -> Self {
        MemoryElement {
            parent: Some(parent),
            ..Default::default()
        }
    }

    /// Embed this element in `parent`.
    pub fn with_parent(mut self, parent: Arc<dyn RecordElement>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn dirty_no_changed_count(&self) -> usize {
        self.dirty_no_changed.load(Ordering::SeqCst)
    }

    /// The rids of the records currently tracked, one per occurrence, in tracking order.
    pub fn tracked(&self) -> Vec<Rid> {
        self.tracked.lock().clone()
    }
}

impl RecordElement for MemoryElement {
    fn set_dirty(&self) {
        self.dirty.fetch_add(1, Ordering::SeqCst);
    }

    fn set_dirty_no_changed(&self) {
        self.dirty_no_changed.fetch_add(1, Ordering::SeqCst);
    }

    fn track(&self, record: &RecordRef) {
        self.tracked.lock().push(record.rid());
    }

    fn untrack(&self, record: &RecordRef) {
        let rid = record.rid();
        let mut tracked = self.tracked.lock();
        if let Some(i) = tracked.iter().position(|r| *r == rid) {
            tracked.remove(i);
        }
    }

    fn owner(&self) -> Option<Arc<dyn RecordElement>> {
        self.parent.clone()
    }

    fn cluster_id(&self) -> Option<i16> {
        self.cluster_id
    }
}
