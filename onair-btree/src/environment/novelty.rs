//! The novelty: pages flushed by the current mutable transaction,
//! kept as page objects until the transaction commits.
use onair_btree_core::{Address, Page};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct NoveltyPage {
    epoch: u64,
    page: Arc<Page>,
}

#[derive(Debug, Default)]
pub(crate) struct Novelty {
    pages: HashMap<u64, NoveltyPage>,
}

impl Novelty {
    pub(crate) fn insert(&mut self, epoch: u64, offset: u64, page: Arc<Page>) {
        let old = self.pages.insert(offset, NoveltyPage { epoch, page });
        debug_assert!(old.is_none());
    }

    /// The page at `address`, if it is a novelty address written by
    /// the same epoch.
    pub(crate) fn get(&self, address: Address) -> Option<Arc<Page>> {
        if let Address::Novelty { epoch, offset } = address {
            self.pages
                .get(&offset)
                .filter(|p| p.epoch == epoch)
                .map(|p| p.page.clone())
        } else {
            None
        }
    }

    pub(crate) fn remove(&mut self, offset: u64) -> Option<Arc<Page>> {
        self.pages.remove(&offset).map(|p| p.page)
    }

    /// Drop all pages written by `epoch`, returning how many were
    /// dropped.
    pub(crate) fn discard(&mut self, epoch: u64) -> usize {
        let before = self.pages.len();
        self.pages.retain(|_, p| p.epoch != epoch);
        before - self.pages.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.pages.len()
    }
}
