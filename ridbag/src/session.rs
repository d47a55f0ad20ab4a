//! The explicit context bag operations run in.

use ridbag_core::Rid;

use crate::{commit::CommitQueue, options::Options, tree::CollectionManager, RidBag};

/// The transaction a bag is mutated and serialized within.
pub trait Transaction {
    /// The queue of storage operations applied atomically at commit.
    ///
    /// Only local transactions running inside an atomic operation have one. Bags are serialized
    /// inline when there is none.
    fn deferred(&self) -> Option<&CommitQueue>;

    /// The persistent rid assigned by this transaction to a record which had the temporary rid
    /// `rid`, if it has been assigned yet.
    fn refresh_rid(&self, _rid: &Rid) -> Option<Rid> {
        None
    }
}

/// Everything a bag needs from the database it belongs to.
pub struct Session<'a> {
    collections: &'a dyn CollectionManager,
    transaction: Option<&'a dyn Transaction>,
    remote: bool,
    options: Options,
}

impl<'a> Session<'a> {
    pub fn new(collections: &'a dyn CollectionManager) -> Self {
        Session {
            collections,
            transaction: None,
            remote: false,
            options: Options::new(),
        }
    }

    /// Run operations inside the given transaction.
    pub fn with_transaction(mut self, transaction: &'a dyn Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    /// Set whether the session talks to a remote server. Remote sessions always serialize bags
    /// inline.
    pub fn remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn collections(&self) -> &'a dyn CollectionManager {
        self.collections
    }

    pub fn transaction(&self) -> Option<&'a dyn Transaction> {
        self.transaction
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Create an empty bag configured by the session options.
    pub fn new_bag(&self) -> RidBag {
        let mut bag = RidBag::new();
        if self.options.track_changes {
            bag.enable_tracking();
        }
        bag
    }

    /// The deferred-write queue bag storage operations are pushed to, if any.
    pub(crate) fn deferred(&self) -> Option<&'a CommitQueue> {
        if self.remote {
            return None;
        }
        self.transaction.and_then(|tx| tx.deferred())
    }

    /// Map a temporary rid to the persistent one the transaction assigned to it.
    pub(crate) fn refresh_rid(&self, rid: Rid) -> Rid {
        if !rid.is_temporary() {
            return rid;
        }
        self.transaction
            .and_then(|tx| tx.refresh_rid(&rid))
            .unwrap_or(rid)
    }
}
