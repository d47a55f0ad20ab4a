//! Storage operations deferred to transaction commit.
//!
//! Serializing a bag inside a local transaction does not write its changes. Instead it pushes a
//! [`CommitAction`] to the transaction's [`CommitQueue`], which applies them to the trees
//! atomically when the transaction commits.

use parking_lot::Mutex;
use ridbag_core::CollectionPointer;

use crate::{
    error::{InCollection, Result},
    overlay::ChangeOverlay,
    tree::{AtomicOperationId, CollectionManager, TreeLease},
};

/// A storage operation on a bag tree.
#[derive(Debug, Clone)]
pub enum CommitAction {
    /// Apply the captured changes to the tree.
    UpdateTree {
        pointer: CollectionPointer,
        changes: ChangeOverlay,
    },
    /// Destroy the tree.
    DeleteTree { pointer: CollectionPointer },
}

impl CommitAction {
    pub fn pointer(&self) -> CollectionPointer {
        match self {
            CommitAction::UpdateTree { pointer, .. } | CommitAction::DeleteTree { pointer } => {
                *pointer
            }
        }
    }

    pub fn execute(&self, manager: &dyn CollectionManager) -> Result<()> {
        match self {
            CommitAction::UpdateTree { pointer, changes } => {
                let tree = TreeLease::acquire(manager, *pointer)?;
                for (key, change) in changes.iter() {
                    let stored = tree.get(&key).in_collection(*pointer)?.unwrap_or(0);
                    let count = change.apply_to(stored);
                    if count <= 0 {
                        tree.remove(&key).in_collection(*pointer)?;
                    } else {
                        tree.put(key, count).in_collection(*pointer)?;
                    }
                }
                tracing::debug!(collection = %pointer, changes = changes.len(), "tree updated");
                Ok(())
            }
            CommitAction::DeleteTree { pointer } => {
                manager.delete_tree(pointer).in_collection(*pointer)?;
                tracing::debug!(collection = %pointer, "tree deleted");
                Ok(())
            }
        }
    }
}

/// The deferred-write context of one atomic operation.
pub struct CommitQueue {
    atomic_operation: AtomicOperationId,
    actions: Mutex<Vec<CommitAction>>,
}

impl CommitQueue {
    pub fn new(atomic_operation: AtomicOperationId) -> Self {
        CommitQueue {
            atomic_operation,
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn atomic_operation(&self) -> AtomicOperationId {
        self.atomic_operation
    }

    pub fn push(&self, action: CommitAction) {
        self.actions.lock().push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// Take all queued actions, in the order they were pushed.
    pub fn drain(&self) -> Vec<CommitAction> {
        std::mem::take(&mut *self.actions.lock())
    }

    /// Execute and remove all queued actions in order.
    ///
    /// Returns the pointers of the trees which were destroyed; the bags they belonged to should
    /// be told with [`crate::RidBag::confirm_delete`]. Stops at the first failure, leaving the
    /// remaining actions unapplied.
    pub fn apply(&self, manager: &dyn CollectionManager) -> Result<Vec<CollectionPointer>> {
        let mut deleted = Vec::new();
        for action in self.drain() {
            action.execute(manager)?;
            if let CommitAction::DeleteTree { pointer } = action {
                deleted.push(pointer);
            }
        }
        Ok(deleted)
    }
}
