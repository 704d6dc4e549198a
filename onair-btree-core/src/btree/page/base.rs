//! Bookkeeping common to leaves and internal pages: a flat array of
//! fixed-width keys, and the number of slots in use.
use crate::{Prototype, TreeError};
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct BasePage {
    prototype: Prototype,
    epoch: u64,
    /// `base * key_size` bytes, of which the first `size * key_size`
    /// are keys, in strictly increasing order.
    keys: Vec<u8>,
    size: usize,
}

impl BasePage {
    pub(crate) fn new(prototype: Prototype, epoch: u64) -> Self {
        BasePage {
            prototype,
            epoch,
            keys: vec![0; prototype.base() * prototype.key_size()],
            size: 0,
        }
    }

    /// Build a page from `size` keys stored contiguously in `keys`.
    pub(crate) fn from_keys(prototype: Prototype, epoch: u64, keys: &[u8]) -> Result<Self, TreeError> {
        let ks = prototype.key_size();
        if keys.len() % ks != 0 {
            return Err(TreeError::InvalidKeyLength {
                expected: ks,
                got: keys.len() % ks,
            });
        }
        let size = keys.len() / ks;
        if size > prototype.base() {
            return Err(TreeError::Overflow {
                base: prototype.base(),
            });
        }
        let mut page = BasePage::new(prototype, epoch);
        page.keys[..keys.len()].copy_from_slice(keys);
        page.size = size;
        Ok(page)
    }

    pub fn prototype(&self) -> &Prototype {
        &self.prototype
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// In-memory pages are always transient. Pages decoded from
    /// storage are too, but are never mutated: every update copies
    /// them first.
    pub fn is_transient(&self) -> bool {
        true
    }

    /// A copy of the first key.
    pub fn min_key(&self) -> Result<Vec<u8>, TreeError> {
        if self.size == 0 {
            return Err(TreeError::EmptyPage);
        }
        Ok(self.key_slice(0).to_vec())
    }

    pub(crate) fn increment_size(&mut self) -> Result<(), TreeError> {
        if self.size >= self.prototype.base() {
            return Err(TreeError::Overflow {
                base: self.prototype.base(),
            });
        }
        self.size += 1;
        Ok(())
    }

    pub(crate) fn decrement_size(&mut self, n: usize) -> Result<(), TreeError> {
        if n > self.size {
            return Err(TreeError::Underflow {
                size: self.size,
                requested: n,
            });
        }
        self.size -= n;
        Ok(())
    }

    /// A copy of the key at `index`, which never aliases the page.
    pub fn key(&self, index: usize) -> Vec<u8> {
        self.key_slice(index).to_vec()
    }

    pub(crate) fn key_slice(&self, index: usize) -> &[u8] {
        debug_assert!(index < self.size);
        let ks = self.prototype.key_size();
        &self.keys[index * ks..(index + 1) * ks]
    }

    /// The keys in use, contiguously.
    pub fn keys(&self) -> &[u8] {
        &self.keys[..self.size * self.prototype.key_size()]
    }

    /// Binary search for `key`: `Ok(i)` if slot `i` holds `key`,
    /// `Err(i)` if `key` would be inserted at `i`.
    pub fn search(&self, key: &[u8]) -> Result<usize, usize> {
        let (mut lo, mut hi) = (0, self.size);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key_slice(mid).cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    pub(crate) fn set_key(&mut self, index: usize, key: &[u8]) -> Result<(), TreeError> {
        self.prototype.check_key(key)?;
        let ks = self.prototype.key_size();
        self.keys[index * ks..(index + 1) * ks].copy_from_slice(key);
        Ok(())
    }

    /// Shift slots `pos..size` one slot to the right, and write `key`
    /// at `pos`.
    pub(crate) fn insert_key(&mut self, pos: usize, key: &[u8]) -> Result<(), TreeError> {
        self.prototype.check_key(key)?;
        if pos > self.size {
            return Err(TreeError::Unsupported("insertion past the end of a page"));
        }
        self.increment_size()?;
        let ks = self.prototype.key_size();
        self.keys
            .copy_within(pos * ks..(self.size - 1) * ks, (pos + 1) * ks);
        self.keys[pos * ks..(pos + 1) * ks].copy_from_slice(key);
        Ok(())
    }

    pub(crate) fn remove_key(&mut self, pos: usize) -> Result<(), TreeError> {
        if pos >= self.size {
            return Err(TreeError::Underflow {
                size: self.size,
                requested: pos + 1,
            });
        }
        let ks = self.prototype.key_size();
        self.keys.copy_within((pos + 1) * ks..self.size * ks, pos * ks);
        self.decrement_size(1)
    }

    /// Append the keys of `other` after ours.
    pub(crate) fn merge_with(&mut self, other: &BasePage) -> Result<(), TreeError> {
        if self.size + other.size > self.prototype.base() {
            return Err(TreeError::Overflow {
                base: self.prototype.base(),
            });
        }
        let ks = self.prototype.key_size();
        let start = self.size * ks;
        self.keys[start..start + other.size * ks].copy_from_slice(other.keys());
        self.size += other.size;
        Ok(())
    }

    /// Move the `length` keys starting at `from` to a fresh page. The
    /// moved range must be the tail of this page.
    pub(crate) fn split(&mut self, from: usize, length: usize) -> Result<BasePage, TreeError> {
        if from + length != self.size {
            return Err(TreeError::Underflow {
                size: self.size,
                requested: from + length,
            });
        }
        let ks = self.prototype.key_size();
        let right = BasePage::from_keys(
            self.prototype,
            self.epoch,
            &self.keys[from * ks..(from + length) * ks],
        )?;
        self.decrement_size(length)?;
        Ok(right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(keys: &[u32]) -> BasePage {
        let mut p = BasePage::new(Prototype::new(4, 4).unwrap(), 0);
        for (i, k) in keys.iter().enumerate() {
            p.insert_key(i, &k.to_be_bytes()).unwrap();
        }
        p
    }

    #[test]
    fn empty_min_key() {
        let p = page(&[]);
        assert_eq!(p.min_key(), Err(TreeError::EmptyPage));
        assert_eq!(p.search(&[0; 4]), Err(0));
    }

    #[test]
    fn size_bounds() {
        let mut p = page(&[1, 2, 3, 4]);
        assert_eq!(p.increment_size(), Err(TreeError::Overflow { base: 4 }));
        assert_eq!(
            p.decrement_size(5),
            Err(TreeError::Underflow {
                size: 4,
                requested: 5
            })
        );
        p.decrement_size(4).unwrap();
        assert_eq!(p.size(), 0);
    }

    #[test]
    fn insert_remove_search() {
        let mut p = page(&[10, 30]);
        p.insert_key(1, &20u32.to_be_bytes()).unwrap();
        assert_eq!(p.keys(), &[0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 30][..]);
        assert_eq!(p.search(&20u32.to_be_bytes()), Ok(1));
        assert_eq!(p.search(&25u32.to_be_bytes()), Err(2));
        p.remove_key(0).unwrap();
        assert_eq!(p.min_key().unwrap(), 20u32.to_be_bytes().to_vec());
        assert!(matches!(
            p.insert_key(0, &[1, 2]),
            Err(TreeError::InvalidKeyLength { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn key_is_a_copy() {
        let p = page(&[7]);
        let mut k = p.key(0);
        k[3] = 8;
        assert_eq!(p.key(0), 7u32.to_be_bytes().to_vec());
    }

    #[test]
    fn split_and_merge() {
        let mut p = page(&[1, 2, 3, 4]);
        let r = p.split(2, 2).unwrap();
        assert_eq!(p.size(), 2);
        assert_eq!(r.min_key().unwrap(), 3u32.to_be_bytes().to_vec());
        assert!(p.split(0, 1).is_err());
        p.merge_with(&r).unwrap();
        assert_eq!(p.size(), 4);
        assert_eq!(p.key(3), 4u32.to_be_bytes().to_vec());
        assert_eq!(p.merge_with(&r), Err(TreeError::Overflow { base: 4 }));
    }
}
