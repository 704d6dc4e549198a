use super::*;
use onair_btree_core::AllocPage;
use std::marker::PhantomData;

/// A mutable transaction. There is at most one at any time in an
/// environment, and it can't be sent to another thread: pages it
/// allocates are only visible to the threads it hands trees to.
pub struct MutTxn<E: Borrow<Env>> {
    pub(crate) env: E,
    /// Epoch of this transaction, i.e. 1 + the epoch of the last
    /// committed transaction.
    epoch: u64,
    /// Offsets of the novelty pages allocated by this transaction.
    owned: Vec<u64>,
    /// Root slots, as they will be after the commit.
    roots: Vec<Option<RootRecord>>,
    committed: bool,
    not_send: PhantomData<*const ()>,
}

impl<E: Borrow<Env>> std::fmt::Debug for MutTxn<E> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "MutTxn {{ epoch: {}, owned: {} }}", self.epoch, self.owned.len())
    }
}

/// When dropping a transaction, we need to unlock the environment,
/// and throw away the novelty pages if the transaction wasn't
/// committed.
impl<E: Borrow<Env>> Drop for MutTxn<E> {
    fn drop(&mut self) {
        let env = self.env.borrow();
        if !self.committed {
            let n = env.novelty.write().discard(self.epoch);
            debug!("ABORT epoch = {:?}, {:?} novelty pages dropped", self.epoch, n);
        }
        unsafe { env.mut_txn_unlock() }
    }
}

/// Transactions that can be committed.
pub trait Commit {
    /// Commit the transaction.
    fn commit(self) -> Result<(), Error>;
}

impl Env {
    /// Start a mutable transaction, waiting for the current one (if
    /// any) to finish. Mutable transactions that go out of scope
    /// are automatically aborted.
    pub fn mut_txn_begin<E: Borrow<Self>>(env: E) -> MutTxn<E> {
        let (epoch, roots) = {
            let env_ = env.borrow();
            env_.mut_txn_lock();
            let roots = env_.roots.read().clone();
            (env_.epoch() + 1, roots)
        };
        debug!("BEGIN_MUT_TXN epoch = {:?}", epoch);
        MutTxn {
            env,
            epoch,
            owned: Vec::new(),
            roots,
            committed: false,
            not_send: PhantomData,
        }
    }
}

impl<E: Borrow<Env>> MutTxn<E> {
    /// Borrow env
    pub fn env_borrow(&self) -> &Env {
        self.env.borrow()
    }

    /// The epoch this transaction will commit.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Flush `tree` and store it in root slot `num`. This doesn't
    /// make it visible to readers until the commit. Returns the
    /// flushed tree.
    pub fn set_root(&mut self, num: usize, tree: &TransientBTree) -> Result<TransientBTree, Error> {
        if num >= self.roots.len() {
            return Err(Error::RootOutOfBounds(num));
        }
        let tree = tree.flush(self)?;
        let address = tree
            .address()
            .ok_or(Error::Corrupt("flushed tree without a root address"))?;
        self.roots[num] = Some(RootRecord {
            address,
            epoch: tree.epoch(),
            prototype: *tree.prototype(),
        });
        Ok(tree)
    }

    /// Empty root slot `num`.
    pub fn remove_root(&mut self, num: usize) -> Result<(), Error> {
        let slot = self.roots.get_mut(num).ok_or(Error::RootOutOfBounds(num))?;
        *slot = None;
        Ok(())
    }

    /// The tree in root slot `num`, including the changes made by
    /// this transaction.
    pub fn root_tree(&self, num: usize) -> Option<TransientBTree> {
        self.roots.get(num).and_then(|r| r.as_ref()).map(RootRecord::tree)
    }
}

impl<E: Borrow<Env>> Commit for MutTxn<E> {
    fn commit(mut self) -> Result<(), Error> {
        debug!("COMMIT epoch = {:?}", self.epoch);
        let owned = std::mem::take(&mut self.owned);
        let env = self.env.borrow();

        // Encode everything before touching the store, so that a
        // failure leaves the environment as it was.
        let mut encoded = Vec::with_capacity(owned.len());
        {
            let novelty = env.novelty.read();
            for &offset in owned.iter() {
                let address = Address::Novelty {
                    epoch: self.epoch,
                    offset,
                };
                let page = novelty.get(address).ok_or(Error::UnknownAddress(address))?;
                encoded.push((offset, codec::encode(&page)?));
            }
        }

        // Store first, then remove from the novelty: a concurrent
        // reader resolving a novelty address finds it in one or the
        // other.
        {
            let mut stored = env.stored.write();
            for (offset, bytes) in encoded {
                stored.insert(offset, bytes.into());
            }
        }
        {
            let mut novelty = env.novelty.write();
            for offset in owned.iter() {
                novelty.remove(*offset);
            }
        }

        // Publish the roots and the epoch atomically for readers.
        {
            let mut roots = env.roots.write();
            *roots = self.roots.clone();
            env.epoch.store(self.epoch, Ordering::Release);
        }
        debug!("/COMMIT {:?} pages", owned.len());
        self.committed = true;
        Ok(())
    }
}

impl<E: Borrow<Env>> LoadPage for MutTxn<E> {
    type Error = Error;
    fn load_page(&self, address: Address) -> Result<Arc<Page>, Error> {
        self.env.borrow().load(address)
    }
}

impl<E: Borrow<Env>> AllocPage for MutTxn<E> {
    fn alloc_page(&mut self, page: Arc<Page>) -> Result<Address, Error> {
        let env = self.env.borrow();
        let offset = env.next_offset.fetch_add(1, Ordering::AcqRel);
        trace!("alloc_page {:?}, epoch {:?}", offset, self.epoch);
        env.novelty.write().insert(self.epoch, offset, page);
        self.owned.push(offset);
        Ok(Address::Novelty {
            epoch: self.epoch,
            offset,
        })
    }
}
