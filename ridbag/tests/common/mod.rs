use std::{collections::BTreeMap, sync::Arc};

use ridbag::{
    mem::{MemoryCollectionManager, MemoryElement, MemoryTransaction},
    Options, RecordElement, RecordRef, Rid, RidBag, Session,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const ENV_NAME: &str = "RIDBAG_LOG";

/// Install a subscriber printing through the test harness. Controlled by `RIDBAG_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var(ENV_NAME)
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn rid(position: i64) -> Rid {
    Rid::new(10, position)
}

pub fn record(position: i64) -> RecordRef {
    RecordRef::new(rid(position))
}

/// The multiplicity of every rid yielded by iterating the bag.
pub fn contents(bag: &mut RidBag, session: &Session) -> BTreeMap<Rid, usize> {
    let mut counts = BTreeMap::new();
    for record in bag.iter(session) {
        *counts.entry(record.unwrap().rid()).or_insert(0) += 1;
    }
    counts
}

pub fn counts<const N: usize>(entries: [(i64, usize); N]) -> BTreeMap<Rid, usize> {
    entries
        .into_iter()
        .map(|(position, count)| (rid(position), count))
        .collect()
}

/// A database of in-memory trees with a single open transaction.
pub struct Test {
    pub manager: MemoryCollectionManager,
    pub tx: MemoryTransaction,
    pub owner: Arc<MemoryElement>,
    options: Options,
}

#[allow(dead_code)]
impl Test {
    /// A local transaction which defers tree writes to its commit queue.
    pub fn new() -> Self {
        Self::with_transaction(MemoryTransaction::local(1))
    }

    /// A transaction which has bags serialized inline.
    pub fn inline() -> Self {
        Self::with_transaction(MemoryTransaction::without_deferred())
    }

    fn with_transaction(tx: MemoryTransaction) -> Self {
        init_tracing();
        Test {
            manager: MemoryCollectionManager::new(),
            tx,
            owner: Arc::new(MemoryElement::in_cluster(10)),
            options: Options::new(),
        }
    }

    pub fn prefetch_size(&mut self, prefetch_size: usize) {
        self.options.prefetch_size(prefetch_size);
    }

    pub fn session(&self) -> Session<'_> {
        Session::new(&self.manager)
            .with_transaction(&self.tx)
            .with_options(self.options.clone())
    }

    /// A session outside of any transaction.
    pub fn bare_session(&self) -> Session<'_> {
        Session::new(&self.manager).with_options(self.options.clone())
    }

    /// A new bag owned by the test record.
    pub fn bag(&self) -> RidBag {
        let session = self.session();
        let mut bag = session.new_bag();
        let owner: Arc<dyn RecordElement> = self.owner.clone();
        bag.set_owner(Some(owner)).unwrap();
        bag
    }

    /// Apply everything queued in the transaction to the trees, as a commit would.
    pub fn commit(&self, bag: &mut RidBag) {
        let queue = self.tx.queue().expect("transaction has no commit queue");
        let deleted = queue.apply(&self.manager).unwrap();
        if bag.pointer().map_or(false, |p| deleted.contains(&p)) {
            bag.confirm_delete();
        } else {
            bag.clear_changes();
        }
        assert_eq!(self.manager.outstanding_leases(), 0);
    }
}
