//! Copy-on-write B+ trees. The core operations (lookup, iterate, put
//! and delete) are implemented on [`page::Page`], and recurse from
//! the root down to a leaf, copying every page on the way. The
//! functions of this module only handle the root: growing the tree
//! when the root splits, and collapsing it when deletions leave it
//! with a single child.
//!
//! A [`TransientBTree`] is a value. Cloning it is cheap, and no
//! operation modifies it, which means that any number of threads can
//! read older versions of a tree while a writer builds new ones.
use crate::{Address, AllocPage, ChildRef, KeyValueConsumer, LoadPage, Prototype};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::*;

pub mod cursor;
pub use cursor::Iter;
pub mod del;
pub mod page;
pub mod put;
pub use put::PutResult;

use page::{BottomPage, Page};

/// A version of a tree.
#[derive(Debug, Clone)]
pub struct TransientBTree {
    pub(crate) root: ChildRef,
    pub(crate) epoch: u64,
    pub(crate) prototype: Prototype,
}

impl TransientBTree {
    /// An empty tree, whose root is an empty leaf.
    pub fn new(prototype: Prototype) -> Self {
        TransientBTree {
            root: ChildRef::from(Page::Bottom(BottomPage::new(prototype, 0))),
            epoch: 0,
            prototype,
        }
    }

    /// A tree whose root was flushed at `address`.
    pub fn from_address(prototype: Prototype, address: Address, epoch: u64) -> Self {
        TransientBTree {
            root: ChildRef::Unresolved(address),
            epoch,
            prototype,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn prototype(&self) -> &Prototype {
        &self.prototype
    }

    /// The address of the root, if this tree has been flushed.
    pub fn address(&self) -> Option<Address> {
        self.root.address()
    }

    pub fn root_ref(&self) -> &ChildRef {
        &self.root
    }

    /// Resolve the root page.
    pub fn root<T: LoadPage>(&self, txn: &T) -> Result<Arc<Page>, T::Error> {
        self.root.resolve(txn)
    }

    /// The value bound to `key`, if any.
    pub fn get<T: LoadPage>(&self, txn: &T, key: &[u8]) -> Result<Option<Vec<u8>>, T::Error> {
        self.prototype.check_key(key)?;
        Ok(self.root(txn)?.get(txn, key)?.map(|v| v.to_vec()))
    }

    /// Feed the entries whose key is greater than or equal to `from`
    /// (or all entries if `from` is `None`) to `consumer`, in
    /// increasing order of keys, until the consumer returns
    /// `false`. Returns `false` if the scan was stopped.
    pub fn for_each<T: LoadPage, C: KeyValueConsumer>(
        &self,
        txn: &T,
        from: Option<&[u8]>,
        mut consumer: C,
    ) -> Result<bool, T::Error> {
        if let Some(from) = from {
            self.prototype.check_key(from)?;
        }
        self.root(txn)?.for_each(txn, from, &mut consumer)
    }

    /// An iterator over the entries whose key is greater than or
    /// equal to `from`.
    pub fn iter<'a, T: LoadPage>(&self, txn: &'a T, from: Option<&[u8]>) -> Result<Iter<'a, T>, T::Error> {
        if let Some(from) = from {
            self.prototype.check_key(from)?;
        }
        Iter::new(txn, self.root(txn)?, from)
    }

    /// Number of entries, by scanning the whole tree.
    pub fn len<T: LoadPage>(&self, txn: &T) -> Result<usize, T::Error> {
        let mut n = 0;
        self.for_each(txn, None, |_: &[u8], _: &[u8]| {
            n += 1;
            true
        })?;
        Ok(n)
    }

    pub fn is_empty<T: LoadPage>(&self, txn: &T) -> Result<bool, T::Error> {
        Ok(self.root(txn)?.size() == 0)
    }

    /// Number of levels, 1 for a tree made of a single leaf.
    pub fn height<T: LoadPage>(&self, txn: &T) -> Result<usize, T::Error> {
        let mut height = 1;
        let mut page = self.root(txn)?;
        loop {
            let child = match &*page {
                Page::Internal(p) if p.size() > 0 => p.get_child(txn, 0)?,
                _ => return Ok(height),
            };
            page = child;
            height += 1
        }
    }

    /// Write all pages that are only in memory through `txn`,
    /// children first. The resulting tree has the same contents, its
    /// root is an address, and its epoch is the next one. Flushing a
    /// tree whose root is already an address returns the same tree.
    pub fn flush<T: AllocPage>(&self, txn: &mut T) -> Result<TransientBTree, T::Error> {
        let page = match self.root {
            ChildRef::Unresolved(_) => return Ok(self.clone()),
            ChildRef::Resolved(ref page) => page,
        };
        let address = Page::flush(page, txn)?;
        debug!("flushed epoch {:?} to {}", self.epoch, address);
        Ok(TransientBTree {
            root: ChildRef::Unresolved(address),
            epoch: self.epoch + 1,
            prototype: self.prototype,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeError;
    use alloc::vec;

    /// Pages flushed to a vector, at their index.
    #[derive(Default)]
    struct Mem {
        pages: Vec<Arc<Page>>,
    }

    impl LoadPage for Mem {
        type Error = TreeError;
        fn load_page(&self, address: Address) -> Result<Arc<Page>, TreeError> {
            self.pages
                .get(address.offset() as usize)
                .cloned()
                .ok_or(TreeError::Unsupported("unknown address"))
        }
    }

    impl AllocPage for Mem {
        fn alloc_page(&mut self, page: Arc<Page>) -> Result<Address, TreeError> {
            self.pages.push(page);
            Ok(Address::Novelty {
                epoch: 0,
                offset: self.pages.len() as u64 - 1,
            })
        }
    }

    fn k(n: u32) -> [u8; 4] {
        n.to_be_bytes()
    }

    fn keys<T: LoadPage>(txn: &T, tree: &TransientBTree) -> Vec<u32> {
        let mut v = Vec::new();
        tree.for_each(txn, None, |k: &[u8], _: &[u8]| {
            v.push(u32::from_be_bytes([k[0], k[1], k[2], k[3]]));
            true
        })
        .unwrap_or(false);
        v
    }

    #[test]
    fn root_split_and_collapse() {
        let txn = Mem::default();
        let mut tree = TransientBTree::new(Prototype::new(4, 4).unwrap());
        for i in 1..=5 {
            tree = tree.put(&txn, &k(i), &[i as u8], true).unwrap().tree_or(&tree);
        }
        assert_eq!(tree.height(&txn).unwrap(), 2);
        assert_eq!(keys(&txn, &tree), vec![1, 2, 3, 4, 5]);
        match &*tree.root(&txn).unwrap() {
            Page::Internal(p) => {
                assert_eq!(p.size(), 2);
                assert_eq!(p.base().key(1), k(4).to_vec());
            }
            p => panic!("{:?}", p),
        }
        let mut t = tree.clone();
        for i in [5, 4, 3] {
            t = t.delete(&txn, &k(i), None).unwrap().unwrap();
        }
        assert_eq!(t.height(&txn).unwrap(), 1);
        assert_eq!(keys(&txn, &t), vec![1, 2]);
        // The tree we started from hasn't changed.
        assert_eq!(keys(&txn, &tree), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn delete_absent_or_mismatched() {
        let txn = Mem::default();
        let tree = TransientBTree::new(Prototype::new(4, 4).unwrap());
        let tree = tree.put(&txn, &k(1), b"a", true).unwrap().tree_or(&tree);
        assert!(tree.delete(&txn, &k(2), None).unwrap().is_none());
        assert!(tree.delete(&txn, &k(1), Some(b"b")).unwrap().is_none());
        let empty = tree.delete(&txn, &k(1), Some(b"a")).unwrap().unwrap();
        assert!(empty.is_empty(&txn).unwrap());
        assert_eq!(tree.len(&txn).unwrap(), 1);
    }

    #[test]
    fn put_results() {
        let txn = Mem::default();
        let tree = TransientBTree::new(Prototype::new(4, 8).unwrap());
        let tree = tree.put(&txn, &k(1), b"a", true).unwrap().tree_or(&tree);
        assert!(tree.put(&txn, &k(1), b"b", false).unwrap().is_rejected());
        assert!(matches!(
            tree.put(&txn, &k(1), b"a", true).unwrap(),
            PutResult::Unchanged
        ));
        assert_eq!(
            tree.put(&txn, &[1], b"a", true).unwrap_err(),
            TreeError::InvalidKeyLength {
                expected: 4,
                got: 1
            }
        );
        let t2 = tree.put(&txn, &k(1), b"b", true).unwrap().tree_or(&tree);
        assert_eq!(t2.get(&txn, &k(1)).unwrap(), Some(b"b".to_vec()));
        assert_eq!(tree.get(&txn, &k(1)).unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn flush_then_update() {
        let mut txn = Mem::default();
        let mut tree = TransientBTree::new(Prototype::new(4, 4).unwrap());
        for i in 0..40 {
            tree = tree.put(&txn, &k(i), &k(i * 2), true).unwrap().tree_or(&tree);
        }
        let flushed = tree.flush(&mut txn).unwrap();
        assert_eq!(flushed.epoch(), tree.epoch() + 1);
        assert!(flushed.address().is_some());
        let n = txn.pages.len();
        assert!(n > 1);
        // Flushing again is a no-op.
        let again = flushed.flush(&mut txn).unwrap();
        assert_eq!(again.address(), flushed.address());
        assert_eq!(txn.pages.len(), n);

        let updated = flushed.put(&txn, &k(100), b"x", true).unwrap().tree_or(&flushed);
        assert_eq!(updated.root(&txn).unwrap().epoch(), flushed.epoch());
        let updated = updated.flush(&mut txn).unwrap();
        // Only the path to the new leaf is written, plus the siblings
        // created by splits.
        assert!(txn.pages.len() - n <= 2 * updated.height(&txn).unwrap() + 1);
        assert_eq!(keys(&txn, &updated).len(), 41);
        assert_eq!(updated.get(&txn, &k(7)).unwrap(), Some(k(14).to_vec()));
    }

    #[test]
    fn iter_from() {
        let txn = Mem::default();
        let mut tree = TransientBTree::new(Prototype::new(4, 3).unwrap());
        for i in (10..=200).step_by(10) {
            tree = tree.put(&txn, &k(i), b"", true).unwrap().tree_or(&tree);
        }
        let from: Vec<_> = tree
            .iter(&txn, Some(&k(25)))
            .unwrap()
            .map(|e| {
                let (key, _) = e.unwrap();
                u32::from_be_bytes([key[0], key[1], key[2], key[3]])
            })
            .collect();
        assert_eq!(from, (30..=200).step_by(10).collect::<Vec<_>>());
        assert_eq!(tree.iter(&txn, Some(&k(500))).unwrap().count(), 0);
        assert_eq!(tree.iter(&txn, None).unwrap().count(), 20);
    }
}
