//! A multiset of record identifiers layered over a disk-resident sorted tree.
//!
//! A [`RidBag`] holds large adjacency collections without materializing them. Mutations are kept
//! in memory as pending multiplicity changes on top of a bonsai tree owned by a
//! [`CollectionManager`]. Reads consult the tree only when memory cannot answer, and iteration
//! merges both sources in key order while paging through the tree in bounded batches.
//!
//! Changes reach the tree when the bag is serialized: inline, or through the [`CommitQueue`] of
//! the enclosing transaction, which applies them when the transaction commits.
//!
//! Every operation needing storage takes a [`Session`], which carries the collection manager, the
//! transaction and the [`Options`].

mod bag;
mod commit;
mod error;
mod iter;
mod options;
mod overlay;
mod pending;
mod prefetch;
mod record;
mod session;
mod tracker;
mod tree;

pub mod mem;

pub use bag::RidBag;
pub use commit::{CommitAction, CommitQueue};
pub use error::{Error, Result};
pub use iter::RidBagIter;
pub use options::Options;
pub use overlay::ChangeOverlay;
pub use record::{RecordElement, RecordRef};
pub use session::{Session, Transaction};
pub use tracker::{ChangeEvent, ChangeKind, ChangeTimeLine};
pub use tree::{AtomicOperationId, BonsaiTree, CollectionManager, TreeLease};

pub use ridbag_core::{wire, BucketPointer, Change, CollectionPointer, Rid};
