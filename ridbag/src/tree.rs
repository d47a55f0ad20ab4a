//! The contracts of the bonsai trees backing bags, and scoped access to them.
//!
//! Trees are owned by a [`CollectionManager`] which keeps them cached and pinned while they are
//! leased. Every access to a tree goes through a [`TreeLease`] which returns the tree to the
//! manager when dropped, on every exit path.

use std::{ops::Deref, sync::Arc};

use ridbag_core::{CollectionPointer, Rid};

use crate::{
    error::{Error, InCollection, Result},
    overlay::ChangeOverlay,
};

/// Identifies the atomic operation a tree is created within.
pub type AtomicOperationId = u64;

/// A disk-resident sorted map from rid to stored multiplicity.
pub trait BonsaiTree {
    fn get(&self, key: &Rid) -> anyhow::Result<Option<i32>>;

    fn put(&self, key: Rid, value: i32) -> anyhow::Result<()>;

    fn remove(&self, key: &Rid) -> anyhow::Result<Option<i32>>;

    /// The lowest key of the tree, `None` if it is empty.
    fn first_key(&self) -> anyhow::Result<Option<Rid>>;

    /// Visit the entries starting at `from`, in ascending or descending order, until the visitor
    /// returns `false`.
    ///
    /// `from` itself is visited only if `inclusive` is set. Returns `false` if the visitor
    /// stopped the scan.
    fn load_entries_major(
        &self,
        from: &Rid,
        inclusive: bool,
        ascending: bool,
        visitor: &mut dyn FnMut(Rid, i32) -> bool,
    ) -> anyhow::Result<bool>;

    /// The number of occurrences held by the tree once `overlay` is applied to it.
    ///
    /// Keys whose resulting multiplicity is not positive count as absent.
    fn real_bag_size(&self, overlay: &ChangeOverlay) -> anyhow::Result<u64> {
        let mut unapplied = overlay.clone();
        let mut size = 0u64;

        if let Some(first) = self.first_key()? {
            self.load_entries_major(&first, true, true, &mut |key, stored| {
                let count = match unapplied.remove(&key) {
                    Some(change) => change.apply_to(stored),
                    None => stored,
                };
                size += count.max(0) as u64;
                true
            })?;
        }

        size += unapplied.detached_size();
        Ok(size)
    }
}

/// Owns the trees of all bags in a database.
pub trait CollectionManager {
    /// Lease the tree at `pointer`. `Ok(None)` means no such tree exists and nothing is leased.
    fn load_tree(&self, pointer: &CollectionPointer)
        -> anyhow::Result<Option<Arc<dyn BonsaiTree>>>;

    /// Return a tree leased with [`CollectionManager::load_tree`].
    fn release_tree(&self, pointer: &CollectionPointer);

    /// Allocate a new empty tree.
    fn create_tree(
        &self,
        cluster_id: i16,
        atomic_operation: AtomicOperationId,
        owner_id: Option<u128>,
    ) -> anyhow::Result<CollectionPointer>;

    /// Destroy the tree at `pointer`.
    fn delete_tree(&self, pointer: &CollectionPointer) -> anyhow::Result<()>;
}

/// A leased tree, released when dropped.
pub struct TreeLease<'a> {
    manager: &'a dyn CollectionManager,
    pointer: CollectionPointer,
    tree: Arc<dyn BonsaiTree>,
}

impl<'a> TreeLease<'a> {
    pub fn acquire(manager: &'a dyn CollectionManager, pointer: CollectionPointer) -> Result<Self> {
        match manager.load_tree(&pointer).in_collection(pointer)? {
            Some(tree) => {
                tracing::trace!(collection = %pointer, "tree leased");
                Ok(TreeLease {
                    manager,
                    pointer,
                    tree,
                })
            }
            None => Err(Error::TreeMissing {
                collection: pointer,
            }),
        }
    }

    pub fn pointer(&self) -> CollectionPointer {
        self.pointer
    }
}

impl Deref for TreeLease<'_> {
    type Target = dyn BonsaiTree;

    fn deref(&self) -> &Self::Target {
        &*self.tree
    }
}

impl Drop for TreeLease<'_> {
    fn drop(&mut self) {
        self.manager.release_tree(&self.pointer);
        tracing::trace!(collection = %self.pointer, "tree released");
    }
}
