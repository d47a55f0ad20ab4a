use ridbag_core::{wire::DecodeError, CollectionPointer};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by bag operations.
///
/// Absent keys, net-zero multiplicities and empty bags are not errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing the backing tree failed.
    #[error("storage failure in rid bag collection ({collection})")]
    Storage {
        collection: CollectionPointer,
        #[source]
        source: anyhow::Error,
    },

    /// The bag refers to a tree which the collection manager does not know.
    #[error("rid bag is not properly initialized, can not load tree ({collection})")]
    TreeMissing { collection: CollectionPointer },

    /// Allocating the backing tree of a bag failed.
    #[error("error during rid bag tree creation in cluster {cluster_id}")]
    TreeCreation {
        cluster_id: i16,
        #[source]
        source: anyhow::Error,
    },

    /// Bags can only be serialized inside a transaction.
    #[error("changes are not supported outside of transactions")]
    NotInTransaction,

    /// The bag already belongs to another record.
    #[error(
        "this bag is owned by another record; create a new bag and copy the content of the \
         current one to use it elsewhere"
    )]
    OwnerConflict,

    /// A record without identity was still pending when stable identities were required.
    #[error("record added to the bag has not been assigned an identity")]
    UnresolvedIdentity,

    /// A tree must be allocated but no owning record provides a cluster for it.
    #[error("rid bag has no owning record to allocate its tree in")]
    MissingOwnerCluster,

    #[error("malformed serialized rid bag: {0}")]
    Decode(#[from] DecodeError),

    /// Iterator removal was requested in a state which does not allow it.
    #[error("illegal iterator state: {0}")]
    IteratorState(&'static str),
}

/// Attach the owning collection to errors coming from the tree collaborators.
pub(crate) trait InCollection<T> {
    fn in_collection(self, collection: CollectionPointer) -> Result<T>;
}

impl<T> InCollection<T> for anyhow::Result<T> {
    fn in_collection(self, collection: CollectionPointer) -> Result<T> {
        self.map_err(|source| Error::Storage { collection, source })
    }
}
