//! Leaves: keys with their values, no children.
use super::base::BasePage;
use super::Page;
use crate::btree::put::Put;
use crate::{KeyValueConsumer, Prototype, TreeError};
use alloc::sync::Arc;
use alloc::vec::Vec;

#[derive(Debug, Clone)]
pub struct BottomPage {
    pub(crate) base: BasePage,
    /// One value per key slot.
    values: Vec<Arc<[u8]>>,
}

impl BottomPage {
    pub fn new(prototype: Prototype, epoch: u64) -> Self {
        BottomPage {
            base: BasePage::new(prototype, epoch),
            values: Vec::with_capacity(prototype.base()),
        }
    }

    /// Build a leaf from contiguous keys and their values, for
    /// instance when decoding a stored page.
    pub fn from_parts(
        prototype: Prototype,
        epoch: u64,
        keys: &[u8],
        values: Vec<Arc<[u8]>>,
    ) -> Result<Self, TreeError> {
        let base = BasePage::from_keys(prototype, epoch, keys)?;
        if base.size() != values.len() {
            return Err(TreeError::Unsupported("leaf with as many values as keys"));
        }
        Ok(BottomPage { base, values })
    }

    pub fn base(&self) -> &BasePage {
        &self.base
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn value(&self, index: usize) -> &Arc<[u8]> {
        &self.values[index]
    }

    pub fn values(&self) -> &[Arc<[u8]>] {
        &self.values
    }

    /// A copy of this page tagged with `epoch`.
    pub fn transient_copy(&self, epoch: u64) -> Self {
        let mut page = self.clone();
        page.base.set_epoch(epoch);
        page
    }

    pub fn get(&self, key: &[u8]) -> Option<&Arc<[u8]>> {
        self.base.search(key).ok().map(|i| &self.values[i])
    }

    /// Feed the entries with keys greater than or equal to `from` to
    /// `consumer`, in order. Returns `false` if the consumer stopped
    /// the scan.
    pub fn for_each<C: KeyValueConsumer + ?Sized>(&self, from: Option<&[u8]>, consumer: &mut C) -> bool {
        let start = match from.map(|k| self.base.search(k)) {
            Some(Ok(i)) | Some(Err(i)) => i,
            None => 0,
        };
        for i in start..self.size() {
            if !consumer.consume(self.base.key_slice(i), &self.values[i]) {
                return false;
            }
        }
        true
    }

    /// Insert `(key, value)` at slot `pos`, shifting the following
    /// slots to the right.
    pub fn insert_directly(&mut self, pos: usize, key: &[u8], value: Arc<[u8]>) -> Result<(), TreeError> {
        self.base.insert_key(pos, key)?;
        self.values.insert(pos, value);
        Ok(())
    }

    pub(crate) fn remove(&mut self, pos: usize) -> Result<(), TreeError> {
        self.base.remove_key(pos)?;
        self.values.remove(pos);
        Ok(())
    }

    /// Move the `length` entries starting at `from` (the tail of this
    /// page) to a new leaf.
    pub fn split(&mut self, from: usize, length: usize) -> Result<BottomPage, TreeError> {
        let base = self.base.split(from, length)?;
        let values = self.values.split_off(from);
        Ok(BottomPage { base, values })
    }

    /// Append the entries of `other`, a right sibling of this page.
    pub fn merge_with(&mut self, other: &BottomPage) -> Result<(), TreeError> {
        self.base.merge_with(&other.base)?;
        self.values.extend(other.values.iter().cloned());
        Ok(())
    }

    pub fn put(&self, key: &[u8], value: &[u8], overwrite: bool, epoch: u64) -> Result<Put, TreeError> {
        match self.base.search(key) {
            Ok(pos) => {
                if !overwrite {
                    Ok(Put::Duplicate)
                } else if &*self.values[pos] == value {
                    Ok(Put::Unchanged)
                } else {
                    let mut page = self.transient_copy(epoch);
                    page.values[pos] = Arc::from(value);
                    Ok(Put::Ok(Page::Bottom(page)))
                }
            }
            Err(pos) => self.transient_copy(epoch).insert_or_split(pos, key, Arc::from(value)),
        }
    }

    /// Insert at `pos`, splitting this page first if it is full.
    fn insert_or_split(mut self, pos: usize, key: &[u8], value: Arc<[u8]>) -> Result<Put, TreeError> {
        let size = self.size();
        if size < self.base.prototype().base() {
            self.insert_directly(pos, key, value)?;
            return Ok(Put::Ok(Page::Bottom(self)));
        }
        // After the insertion, the left page holds one more entry
        // than the right page if `size + 1` is odd.
        let left_size = (size + 2) / 2;
        if pos < left_size {
            let right = self.split(left_size - 1, size + 1 - left_size)?;
            self.insert_directly(pos, key, value)?;
            Ok(Put::Split {
                left: Page::Bottom(self),
                right: Page::Bottom(right),
            })
        } else {
            let mut right = self.split(left_size, size - left_size)?;
            right.insert_directly(pos - left_size, key, value)?;
            Ok(Put::Split {
                left: Page::Bottom(self),
                right: Page::Bottom(right),
            })
        }
    }

    /// Remove `key`, provided its value is `value` if `value` is
    /// given. Returns `None` if nothing matched.
    pub fn delete(&self, key: &[u8], value: Option<&[u8]>, epoch: u64) -> Result<Option<BottomPage>, TreeError> {
        let pos = match self.base.search(key) {
            Ok(pos) => pos,
            Err(_) => return Ok(None),
        };
        if let Some(value) = value {
            if &*self.values[pos] != value {
                return Ok(None);
            }
        }
        let mut page = self.transient_copy(epoch);
        page.remove(pos)?;
        Ok(Some(page))
    }
}
