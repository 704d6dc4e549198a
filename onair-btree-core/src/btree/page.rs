//! Pages of a transient B+ tree.
//!
//! A page is either a leaf ([`BottomPage`], keys and values) or an
//! internal page ([`InternalPage`], keys and children). Both keep
//! their keys in a flat array of fixed-width slots (see
//! [`base::BasePage`]), compared as byte strings.
//!
//! Pages are never modified once they are reachable from a tree:
//! every update works on a copy (obtained with `transient_copy`), and
//! only the pages on the path from the root to the modified leaf are
//! copied. The other pages are shared between the old and the new
//! version of the tree, through [`ChildRef`].
use crate::btree::put::Put;
use crate::{Address, AllocPage, KeyValueConsumer, LoadPage, Prototype, TreeError};
use alloc::sync::Arc;
use alloc::vec::Vec;

pub mod base;
mod bottom;
mod internal;
mod rebalance;

pub use bottom::BottomPage;
pub use internal::InternalPage;

/// A child of an internal page: either a page in memory, or the
/// address of a page, to be resolved by a [`LoadPage`].
#[derive(Debug, Clone)]
pub enum ChildRef {
    Resolved(Arc<Page>),
    Unresolved(Address),
}

impl ChildRef {
    pub fn resolve<T: LoadPage>(&self, txn: &T) -> Result<Arc<Page>, T::Error> {
        match self {
            ChildRef::Resolved(page) => Ok(page.clone()),
            ChildRef::Unresolved(address) => txn.load_page(*address),
        }
    }

    pub fn address(&self) -> Option<Address> {
        match self {
            ChildRef::Resolved(_) => None,
            ChildRef::Unresolved(address) => Some(*address),
        }
    }
}

impl From<Page> for ChildRef {
    fn from(page: Page) -> Self {
        ChildRef::Resolved(Arc::new(page))
    }
}

impl From<Address> for ChildRef {
    fn from(address: Address) -> Self {
        ChildRef::Unresolved(address)
    }
}

#[derive(Debug, Clone)]
pub enum Page {
    Bottom(BottomPage),
    Internal(InternalPage),
}

impl Page {
    pub fn base(&self) -> &base::BasePage {
        match self {
            Page::Bottom(p) => &p.base,
            Page::Internal(p) => &p.base,
        }
    }

    pub fn prototype(&self) -> &Prototype {
        self.base().prototype()
    }

    pub fn size(&self) -> usize {
        self.base().size()
    }

    pub fn epoch(&self) -> u64 {
        self.base().epoch()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Page::Bottom(_))
    }

    pub fn min_key(&self) -> Result<Vec<u8>, TreeError> {
        self.base().min_key()
    }

    pub fn key(&self, index: usize) -> Vec<u8> {
        self.base().key(index)
    }

    pub fn transient_copy(&self, epoch: u64) -> Page {
        match self {
            Page::Bottom(p) => Page::Bottom(p.transient_copy(epoch)),
            Page::Internal(p) => Page::Internal(p.transient_copy(epoch)),
        }
    }

    pub fn get<T: LoadPage>(&self, txn: &T, key: &[u8]) -> Result<Option<Arc<[u8]>>, T::Error> {
        match self {
            Page::Bottom(p) => Ok(p.get(key).cloned()),
            Page::Internal(p) => p.get(txn, key),
        }
    }

    pub fn for_each<T: LoadPage, C: KeyValueConsumer + ?Sized>(
        &self,
        txn: &T,
        from: Option<&[u8]>,
        consumer: &mut C,
    ) -> Result<bool, T::Error> {
        match self {
            Page::Bottom(p) => Ok(p.for_each(from, consumer)),
            Page::Internal(p) => p.for_each(txn, from, consumer),
        }
    }

    pub fn put<T: LoadPage>(
        &self,
        txn: &T,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
        epoch: u64,
    ) -> Result<Put, T::Error> {
        match self {
            Page::Bottom(p) => Ok(p.put(key, value, overwrite, epoch)?),
            Page::Internal(p) => p.put(txn, key, value, overwrite, epoch),
        }
    }

    pub fn delete<T: LoadPage>(
        &self,
        txn: &T,
        key: &[u8],
        value: Option<&[u8]>,
        epoch: u64,
    ) -> Result<Option<Page>, T::Error> {
        match self {
            Page::Bottom(p) => Ok(p.delete(key, value, epoch)?.map(Page::Bottom)),
            Page::Internal(p) => Ok(p.delete(txn, key, value, epoch)?.map(Page::Internal)),
        }
    }

    pub fn split(&mut self, from: usize, length: usize) -> Result<Page, TreeError> {
        match self {
            Page::Bottom(p) => Ok(Page::Bottom(p.split(from, length)?)),
            Page::Internal(p) => Ok(Page::Internal(p.split(from, length)?)),
        }
    }

    /// Append the entries of `other`, the right sibling of this page,
    /// at the same level of the tree.
    pub fn merge_with(&mut self, other: &Page) -> Result<(), TreeError> {
        match (self, other) {
            (Page::Bottom(p), Page::Bottom(q)) => p.merge_with(q),
            (Page::Internal(p), Page::Internal(q)) => p.merge_with(q),
            _ => Err(TreeError::Unsupported("merging a leaf with an internal page")),
        }
    }

    /// Write `page` and all its resolved descendants through `txn`,
    /// children first, and return the address of `page`.
    pub fn flush<T: AllocPage>(page: &Arc<Page>, txn: &mut T) -> Result<Address, T::Error> {
        let page = match &**page {
            Page::Internal(p) if p.children().iter().any(|c| c.address().is_none()) => {
                Arc::new(Page::Internal(p.map_children(|c| Page::flush(c, txn))?))
            }
            _ => page.clone(),
        };
        txn.alloc_page(page)
    }
}
