//! Deletions from a transient B+ tree.
use super::page::{BottomPage, Page};
use super::TransientBTree;
use crate::{ChildRef, LoadPage};
use log::*;

impl TransientBTree {
    /// If `value` is `None`, delete `key` from the tree. Else, delete
    /// `key` only if it is bound to `value`. Returns `None` if nothing
    /// was deleted.
    ///
    /// The root of the new tree is never an internal page with a
    /// single child: such chains are collapsed, so that the height of
    /// the tree never grows because of a deletion.
    pub fn delete<T: LoadPage>(
        &self,
        txn: &T,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<Option<TransientBTree>, T::Error> {
        self.prototype.check_key(key)?;
        let root = self.root(txn)?;
        let page = if let Some(page) = root.delete(txn, key, value, self.epoch)? {
            page
        } else {
            return Ok(None);
        };
        let root = match page {
            Page::Internal(p) if p.size() == 0 => {
                ChildRef::from(Page::Bottom(BottomPage::new(self.prototype, self.epoch)))
            }
            Page::Internal(p) => {
                if let Some(top) = p.merge_with_children(txn)? {
                    trace!("collapsed the root at epoch {:?}", self.epoch);
                    top
                } else {
                    ChildRef::from(Page::Internal(p))
                }
            }
            leaf => ChildRef::from(leaf),
        };
        Ok(Some(TransientBTree {
            root,
            epoch: self.epoch,
            prototype: self.prototype,
        }))
    }
}
