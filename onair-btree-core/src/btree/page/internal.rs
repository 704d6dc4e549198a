//! Internal pages. The key in slot `i` is always the minimum key of
//! child `i`, so that looking up a key means following the last child
//! whose key is less than or equal to it.
use super::base::BasePage;
use super::rebalance::{merge_or_rebalance, Op};
use super::{ChildRef, Page};
use crate::btree::put::Put;
use crate::{KeyValueConsumer, LoadPage, Prototype, TreeError};
use alloc::sync::Arc;
use alloc::vec::Vec;

#[derive(Debug, Clone)]
pub struct InternalPage {
    pub(crate) base: BasePage,
    children: Vec<ChildRef>,
}

impl InternalPage {
    pub fn new(prototype: Prototype, epoch: u64) -> Self {
        InternalPage {
            base: BasePage::new(prototype, epoch),
            children: Vec::with_capacity(prototype.base()),
        }
    }

    /// Build an internal page from contiguous keys and the matching
    /// children.
    pub fn from_parts(
        prototype: Prototype,
        epoch: u64,
        keys: &[u8],
        children: Vec<ChildRef>,
    ) -> Result<Self, TreeError> {
        let base = BasePage::from_keys(prototype, epoch, keys)?;
        if base.size() != children.len() {
            return Err(TreeError::Unsupported("internal page with as many children as keys"));
        }
        Ok(InternalPage { base, children })
    }

    /// A new root above `left` and `right`, after the old root split.
    pub(crate) fn new_root(left: Page, right: Page, epoch: u64) -> Result<Self, TreeError> {
        let mut page = InternalPage::new(*left.prototype(), epoch);
        let (lk, rk) = (left.min_key()?, right.min_key()?);
        page.insert_directly(0, &lk, ChildRef::from(left))?;
        page.insert_directly(1, &rk, ChildRef::from(right))?;
        Ok(page)
    }

    pub fn base(&self) -> &BasePage {
        &self.base
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn children(&self) -> &[ChildRef] {
        &self.children
    }

    pub fn transient_copy(&self, epoch: u64) -> Self {
        let mut page = self.clone();
        page.base.set_epoch(epoch);
        page
    }

    /// Resolve child `index`, loading it through `txn` if it is only
    /// known by its address.
    pub fn get_child<T: LoadPage>(&self, txn: &T, index: usize) -> Result<Arc<Page>, T::Error> {
        self.children[index].resolve(txn)
    }

    /// Index of the child whose range contains `key`, or `None` if
    /// `key` is smaller than all keys in this page.
    fn floor(&self, key: &[u8]) -> Option<usize> {
        match self.base.search(key) {
            Ok(i) => Some(i),
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }

    pub fn get<T: LoadPage>(&self, txn: &T, key: &[u8]) -> Result<Option<Arc<[u8]>>, T::Error> {
        if let Some(i) = self.floor(key) {
            self.get_child(txn, i)?.get(txn, key)
        } else {
            Ok(None)
        }
    }

    pub fn for_each<T: LoadPage, C: KeyValueConsumer + ?Sized>(
        &self,
        txn: &T,
        from: Option<&[u8]>,
        consumer: &mut C,
    ) -> Result<bool, T::Error> {
        let start = from.and_then(|k| self.floor(k)).unwrap_or(0);
        for i in start..self.size() {
            let from = if i == start { from } else { None };
            if !self.get_child(txn, i)?.for_each(txn, from, consumer)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Insert `child` at slot `pos`, with `key` as its separator.
    pub fn insert_directly(&mut self, pos: usize, key: &[u8], child: ChildRef) -> Result<(), TreeError> {
        self.base.insert_key(pos, key)?;
        self.children.insert(pos, child);
        Ok(())
    }

    pub fn remove_child(&mut self, pos: usize) -> Result<(), TreeError> {
        self.base.remove_key(pos)?;
        self.children.remove(pos);
        Ok(())
    }

    /// Replace child `pos` by `page`, and update the separator.
    pub(crate) fn set_child(&mut self, pos: usize, page: Page) -> Result<(), TreeError> {
        let key = page.min_key()?;
        self.base.set_key(pos, &key)?;
        self.children[pos] = ChildRef::from(page);
        Ok(())
    }

    pub fn split(&mut self, from: usize, length: usize) -> Result<InternalPage, TreeError> {
        let base = self.base.split(from, length)?;
        let children = self.children.split_off(from);
        Ok(InternalPage { base, children })
    }

    pub fn merge_with(&mut self, other: &InternalPage) -> Result<(), TreeError> {
        self.base.merge_with(&other.base)?;
        self.children.extend(other.children.iter().cloned());
        Ok(())
    }

    pub fn put<T: LoadPage>(
        &self,
        txn: &T,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
        epoch: u64,
    ) -> Result<Put, T::Error> {
        let pos = match self.base.search(key) {
            // The separator is the minimum key of an existing leaf.
            Ok(_) if !overwrite => return Ok(Put::Duplicate),
            Ok(pos) => pos,
            Err(pos) => pos.saturating_sub(1),
        };
        let child = self.get_child(txn, pos)?;
        let (new_child, sibling) = match child.put(txn, key, value, overwrite, epoch)? {
            Put::Ok(page) => (page, None),
            Put::Split { left, right } => (left, Some(right)),
            Put::Unchanged => return Ok(Put::Unchanged),
            Put::Duplicate => return Ok(Put::Duplicate),
        };
        let mut page = self.transient_copy(epoch);
        page.set_child(pos, new_child)?;
        if let Some(right) = sibling {
            let key = right.min_key()?;
            Ok(page.insert_or_split(pos + 1, &key, ChildRef::from(right))?)
        } else {
            Ok(Put::Ok(Page::Internal(page)))
        }
    }

    /// Insert at `pos`, splitting this page first if it is full. The
    /// split produces two pages of at least `min_occupancy` entries.
    fn insert_or_split(mut self, pos: usize, key: &[u8], child: ChildRef) -> Result<Put, TreeError> {
        let size = self.size();
        if size < self.base.prototype().base() {
            self.insert_directly(pos, key, child)?;
            return Ok(Put::Ok(Page::Internal(self)));
        }
        let left_size = (size + 2) / 2;
        let right = if pos < left_size {
            let right = self.split(left_size - 1, size + 1 - left_size)?;
            self.insert_directly(pos, key, child)?;
            right
        } else {
            let mut right = self.split(left_size, size - left_size)?;
            right.insert_directly(pos - left_size, key, child)?;
            right
        };
        Ok(Put::Split {
            left: Page::Internal(self),
            right: Page::Internal(right),
        })
    }

    /// Delete `key` (only if bound to `value`, when given) from the
    /// subtree. Returns the new version of this page, which may be
    /// empty or undersized (the caller handles that), or `None` if
    /// nothing was deleted.
    pub fn delete<T: LoadPage>(
        &self,
        txn: &T,
        key: &[u8],
        value: Option<&[u8]>,
        epoch: u64,
    ) -> Result<Option<InternalPage>, T::Error> {
        let pos = if let Some(pos) = self.floor(key) {
            pos
        } else {
            return Ok(None);
        };
        let child = self.get_child(txn, pos)?;
        let new_child = if let Some(c) = child.delete(txn, key, value, epoch)? {
            c
        } else {
            return Ok(None);
        };
        let mut page = self.transient_copy(epoch);
        if new_child.size() == 0 {
            page.remove_child(pos)?;
            return Ok(Some(page));
        }
        let undersized = new_child.size() < new_child.prototype().min_occupancy();
        page.set_child(pos, new_child)?;
        if undersized && page.size() > 1 {
            let left = if pos > 0 { pos - 1 } else { pos };
            page.rebalance(txn, left, epoch)?;
        }
        Ok(Some(page))
    }

    /// Merge or rebalance children `left` and `left + 1`.
    fn rebalance<T: LoadPage>(&mut self, txn: &T, left: usize, epoch: u64) -> Result<(), T::Error> {
        let l = self.get_child(txn, left)?;
        let r = self.get_child(txn, left + 1)?;
        if !need_merge(&l, &r) {
            return Ok(());
        }
        match merge_or_rebalance(&l, &r, epoch)? {
            Op::Merged(page) => {
                self.set_child(left, page)?;
                self.remove_child(left + 1)?;
            }
            Op::Rebalanced { left: lp, right: rp } => {
                self.set_child(left, lp)?;
                self.set_child(left + 1, rp)?;
            }
        }
        Ok(())
    }

    /// Follow the chain of single-child internal pages starting at
    /// this page, and return the first page with more than one child
    /// (or a leaf). Returns `None` if this page has several children.
    pub fn merge_with_children<T: LoadPage>(&self, txn: &T) -> Result<Option<ChildRef>, T::Error> {
        if self.size() != 1 {
            return Ok(None);
        }
        let mut top = self.children[0].clone();
        loop {
            let page = top.resolve(txn)?;
            match &*page {
                Page::Internal(p) if p.size() == 1 => top = p.children[0].clone(),
                _ => return Ok(Some(top)),
            }
        }
    }

    /// A copy of this page where all resolved children have been
    /// flushed with `flush`.
    pub(crate) fn map_children<E, F: FnMut(&Arc<Page>) -> Result<crate::Address, E>>(
        &self,
        mut flush: F,
    ) -> Result<InternalPage, E> {
        let mut page = self.clone();
        for c in page.children.iter_mut() {
            if let ChildRef::Resolved(child) = c {
                let address = flush(child)?;
                *c = ChildRef::Unresolved(address);
            }
        }
        Ok(page)
    }
}

/// Whether two adjacent siblings must be merged or rebalanced: one of
/// them is below the minimum occupancy.
pub(crate) fn need_merge(left: &Page, right: &Page) -> bool {
    let min = left.prototype().min_occupancy();
    left.size() < min || right.size() < min
}
