use crate::Error;
use onair_btree_core::btree::TransientBTree;
use onair_btree_core::{Address, LoadPage, Page, Prototype};
use parking_lot::lock_api::RawMutex as _;
use parking_lot::{RawMutex, RwLock};

use log::*;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

mod muttxn;
pub use muttxn::*;
mod novelty;
pub(crate) use novelty::*;
pub(crate) mod codec;

/// What a root slot holds: enough to rebuild a tree handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RootRecord {
    pub(crate) address: Address,
    pub(crate) epoch: u64,
    pub(crate) prototype: Prototype,
}

impl RootRecord {
    fn tree(&self) -> TransientBTree {
        TransientBTree::from_address(self.prototype, self.address, self.epoch)
    }
}

/// An environment: a store of encoded pages, the novelty overlay of
/// the current mutable transaction, and a fixed number of root slots
/// pointing to trees.
pub struct Env {
    /// Committed pages, encoded.
    pub(crate) stored: RwLock<HashMap<u64, Arc<[u8]>>>,
    pub(crate) novelty: RwLock<Novelty>,
    /// Next free offset, shared by the novelty and the store.
    pub(crate) next_offset: AtomicU64,
    /// Epoch of the last committed transaction.
    pub(crate) epoch: AtomicU64,
    pub(crate) roots: RwLock<Vec<Option<RootRecord>>>,
    mut_txn_lock: RawMutex,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "Env {{ epoch: {}, stored: {}, novelty: {} }}",
            self.epoch.load(Ordering::Acquire),
            self.stored.read().len(),
            self.novelty.read().len()
        )
    }
}

impl Env {
    /// Create an empty environment with `n_roots` root slots.
    pub fn new(n_roots: usize) -> Env {
        Env {
            stored: RwLock::new(HashMap::new()),
            novelty: RwLock::new(Novelty::default()),
            // Offset 0 is never allocated.
            next_offset: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
            roots: RwLock::new(vec![None; n_roots]),
            mut_txn_lock: RawMutex::INIT,
        }
    }

    /// Number of root slots.
    pub fn n_roots(&self) -> usize {
        self.roots.read().len()
    }

    /// Epoch of the last committed mutable transaction.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Number of pages in the store, not counting the novelty.
    pub fn stored_pages(&self) -> usize {
        self.stored.read().len()
    }

    /// Number of pages in the novelty.
    pub fn novelty_pages(&self) -> usize {
        self.novelty.read().len()
    }

    /// Start a read-only transaction, which sees the root slots as
    /// they are now, regardless of later commits.
    pub fn txn_begin<E: Borrow<Self>>(env: E) -> Txn<E> {
        let (epoch, roots) = {
            let env_ = env.borrow();
            let roots = env_.roots.read();
            (env_.epoch(), roots.clone())
        };
        debug!("BEGIN_TXN epoch = {:?}", epoch);
        Txn { env, epoch, roots }
    }

    pub(crate) fn mut_txn_lock(&self) {
        self.mut_txn_lock.lock()
    }

    /// # Safety
    ///
    /// Must only be called by the mutable transaction holding the
    /// lock.
    pub(crate) unsafe fn mut_txn_unlock(&self) {
        self.mut_txn_lock.unlock()
    }

    /// Resolve `address`, looking in the novelty first, then in the
    /// store.
    pub(crate) fn load(&self, address: Address) -> Result<Arc<Page>, Error> {
        if let Address::Novelty { .. } = address {
            if let Some(page) = self.novelty.read().get(address) {
                return Ok(page);
            }
        }
        let bytes = self
            .stored
            .read()
            .get(&address.offset())
            .cloned()
            .ok_or(Error::UnknownAddress(address))?;
        trace!("decoding {}", address);
        Ok(Arc::new(codec::decode(&bytes)?))
    }
}

/// A read-only transaction.
pub struct Txn<E: Borrow<Env>> {
    pub(crate) env: E,
    epoch: u64,
    roots: Vec<Option<RootRecord>>,
}

impl<E: Borrow<Env>> std::fmt::Debug for Txn<E> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "Txn {{ epoch: {} }}", self.epoch)
    }
}

impl<E: Borrow<Env>> Txn<E> {
    /// The epoch this transaction reads.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The tree in root slot `n`, as committed when this transaction
    /// started.
    pub fn root_tree(&self, n: usize) -> Option<TransientBTree> {
        self.roots.get(n).and_then(|r| r.as_ref()).map(RootRecord::tree)
    }
}

impl<E: Borrow<Env>> LoadPage for Txn<E> {
    type Error = Error;
    fn load_page(&self, address: Address) -> Result<Arc<Page>, Error> {
        self.env.borrow().load(address)
    }
}
