//! Insertions into a transient B+ tree.
use super::page::{InternalPage, Page};
use super::TransientBTree;
use crate::{ChildRef, LoadPage};
use log::*;

/// The result of an insertion into a page.
#[derive(Debug)]
pub enum Put {
    /// The new version of the page.
    Ok(Page),
    /// The page was full, and has been split in two. Both pages are
    /// new.
    Split { left: Page, right: Page },
    /// The key was already bound to the exact same value.
    Unchanged,
    /// The key was already in the tree, and `overwrite` was false.
    Duplicate,
}

/// The result of an insertion into a tree.
#[derive(Debug, Clone)]
#[must_use]
pub enum PutResult {
    /// The key is now bound to the value in this new tree.
    Stored(TransientBTree),
    /// The key was already bound to that value, the tree is the same.
    Unchanged,
    /// The key was already in the tree, and `overwrite` was false.
    Rejected,
}

impl PutResult {
    /// The tree after the insertion: `tree` itself if nothing was
    /// stored.
    pub fn tree_or(self, tree: &TransientBTree) -> TransientBTree {
        match self {
            PutResult::Stored(t) => t,
            PutResult::Unchanged | PutResult::Rejected => tree.clone(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, PutResult::Rejected)
    }
}

impl TransientBTree {
    /// Bind `key` to `value`. If `key` is already in the tree and
    /// `overwrite` is false, the insertion is rejected. `self` is left
    /// unchanged in all cases.
    pub fn put<T: LoadPage>(
        &self,
        txn: &T,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
    ) -> Result<PutResult, T::Error> {
        self.prototype.check_key(key)?;
        let root = self.root(txn)?;
        let root = match root.put(txn, key, value, overwrite, self.epoch)? {
            Put::Ok(page) => page,
            Put::Split { left, right } => {
                // The root has split: the tree grows by one level.
                debug!("root split at epoch {:?}", self.epoch);
                Page::Internal(InternalPage::new_root(left, right, self.epoch)?)
            }
            Put::Unchanged => return Ok(PutResult::Unchanged),
            Put::Duplicate => return Ok(PutResult::Rejected),
        };
        Ok(PutResult::Stored(TransientBTree {
            root: ChildRef::from(root),
            epoch: self.epoch,
            prototype: self.prototype,
        }))
    }
}
