#![no_std]

//! This crate defines copy-on-write B+ trees whose pages live either
//! in memory (the "novelty", i.e. pages written by the current
//! writer and not yet durable) or in some external page store.
//!
//! Trees are values: every mutation returns a new
//! [`btree::TransientBTree`] sharing all untouched pages with the
//! previous one, which stays readable. Readers holding an older tree
//! therefore see a consistent snapshot without taking any lock.
//!
//! Storage is abstracted by two traits, implemented by the
//! `onair-btree` crate:
//!
//! - [`LoadPage`] resolves an [`Address`] to a page. It is passed to
//! every tree operation, and must resolve the same address to the
//! same page for the duration of a call.
//! - [`AllocPage`] gives an address to a page, and is only used when
//! flushing a tree.
//!
//! Keys have a fixed width, set by the tree's [`Prototype`], and are
//! compared as byte strings. Values are opaque byte strings of any
//! length.

extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

use alloc::sync::Arc;

pub mod btree;

pub use btree::page::{ChildRef, Page};

/// An immutable reference to a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// A page written in the novelty overlay by the writer of
    /// `epoch`, not durable yet.
    Novelty { epoch: u64, offset: u64 },
    /// A page on persistent storage.
    Stored(u64),
}

impl Address {
    /// The offset of this page in the page store.
    pub fn offset(&self) -> u64 {
        match *self {
            Address::Novelty { offset, .. } => offset,
            Address::Stored(offset) => offset,
        }
    }

    pub fn is_novelty(&self) -> bool {
        matches!(self, Address::Novelty { .. })
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            Address::Novelty { epoch, offset } => write!(fmt, "novelty:{}@{}", offset, epoch),
            Address::Stored(offset) => write!(fmt, "stored:{}", offset),
        }
    }
}

/// Constants shared by all pages of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prototype {
    key_size: usize,
    base: usize,
}

impl Prototype {
    /// Parameters for keys of exactly `key_size` bytes, and pages of
    /// at most `base` entries (the branching factor).
    pub fn new(key_size: usize, base: usize) -> Result<Self, TreeError> {
        if key_size == 0 || key_size > u16::MAX as usize || base < 2 || base > u16::MAX as usize {
            return Err(TreeError::InvalidPrototype { key_size, base });
        }
        Ok(Prototype { key_size, base })
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Number of entries below which a page that isn't the root must
    /// be merged or rebalanced with a sibling.
    pub fn min_occupancy(&self) -> usize {
        (self.base + 1) / 2
    }

    /// Check that `key` has the width of this tree's keys.
    pub fn check_key(&self, key: &[u8]) -> Result<(), TreeError> {
        if key.len() != self.key_size {
            return Err(TreeError::InvalidKeyLength {
                expected: self.key_size,
                got: key.len(),
            });
        }
        Ok(())
    }
}

/// Errors raised by the tree itself, as opposed to errors of the page
/// store. Apart from `InvalidKeyLength` and `InvalidPrototype`, these
/// indicate a bug, and abort the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("minimum key of an empty page")]
    EmptyPage,
    #[error("page overflow (base {base})")]
    Overflow { base: usize },
    #[error("page underflow (removing {requested} out of {size})")]
    Underflow { size: usize, requested: usize },
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid tree parameters: key size {key_size}, base {base}")]
    InvalidPrototype { key_size: usize, base: usize },
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Trait for loading a page.
pub trait LoadPage {
    type Error: From<TreeError>;

    /// Resolve `address` to a page. Novelty pages must be preferred
    /// over stored pages at the same offset.
    fn load_page(&self, address: Address) -> Result<Arc<Page>, Self::Error>;
}

/// Trait for giving addresses to pages, used when flushing trees.
pub trait AllocPage: LoadPage {
    /// Make `page` resolvable, and return its address. All the
    /// children of `page` are unresolved addresses.
    fn alloc_page(&mut self, page: Arc<Page>) -> Result<Address, Self::Error>;
}

/// Callback of [`btree::TransientBTree::for_each`]. Returning `false`
/// stops the scan.
pub trait KeyValueConsumer {
    fn consume(&mut self, key: &[u8], value: &[u8]) -> bool;
}

impl<F: FnMut(&[u8], &[u8]) -> bool> KeyValueConsumer for F {
    fn consume(&mut self, key: &[u8], value: &[u8]) -> bool {
        self(key, value)
    }
}
