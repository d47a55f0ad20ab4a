//! Record handles and the owner contract.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use ridbag_core::Rid;

/// A cheaply cloneable handle to a record.
///
/// The identity of a record may change during its life: records created in memory have no rid
/// until they are saved. Bags therefore keep records without an identity by handle, and two
/// handles only refer to the same record if they were cloned from one another, see
/// [`RecordRef::ptr_eq`].
#[derive(Clone)]
pub struct RecordRef {
    rid: Arc<RwLock<Rid>>,
}

impl RecordRef {
    pub fn new(rid: Rid) -> Self {
        RecordRef {
            rid: Arc::new(RwLock::new(rid)),
        }
    }

    /// A record which has never been saved and has no identity.
    pub fn unsaved() -> Self {
        Self::new(Rid::INVALID)
    }

    /// The current identity of the record.
    pub fn rid(&self) -> Rid {
        *self.rid.read()
    }

    /// Record the identity assigned to the record when it was saved.
    ///
    /// The change is visible through every clone of this handle.
    pub fn assign_rid(&self, rid: Rid) {
        *self.rid.write() = rid;
    }

    /// Whether both handles refer to the same record object.
    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Arc::ptr_eq(&self.rid, &other.rid)
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.rid) as usize
    }
}

impl From<Rid> for RecordRef {
    fn from(rid: Rid) -> Self {
        RecordRef::new(rid)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordRef({})", self.rid())
    }
}

/// The record a bag is embedded in.
///
/// Bags report every addition and removal to their owner so that it is tracked as modified and
/// saved along with the bag. Notifications are best effort: they never influence the outcome of
/// the operation which raised them.
pub trait RecordElement {
    /// Mark the owner as modified.
    fn set_dirty(&self);

    /// Mark the owner as needing to be saved without counting it as a content change.
    fn set_dirty_no_changed(&self);

    /// Start tracking a record referenced from the owner.
    fn track(&self, _record: &RecordRef) {}

    /// Stop tracking a record which is no longer referenced through the bag.
    fn untrack(&self, _record: &RecordRef) {}

    /// The element this one is embedded in, if any.
    fn owner(&self) -> Option<Arc<dyn RecordElement>> {
        None
    }

    /// The cluster of this element, if it is a stored record.
    fn cluster_id(&self) -> Option<i16> {
        None
    }
}

pub(crate) fn same_element(a: &Arc<dyn RecordElement>, b: &Arc<dyn RecordElement>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
