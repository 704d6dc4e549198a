#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
//! Snapshot-isolated copy-on-write B+ trees, with concurrent readers
//! and one writer at a time.
//!
//! This crate is based on the no-std crate `onair-btree-core`, which
//! implements the trees themselves, and supplies the page store they
//! live in.
//!
//! Here's an example of how to use it, with 4-bytes keys and pages of
//! at most 32 entries:
//!
//! ```
//! use onair_btree::*;
//! let env = Env::new(2);
//! let proto = Prototype::new(4, 32).unwrap();
//! let mut txn = Env::mut_txn_begin(&env);
//! let mut tree = btree::TransientBTree::new(proto);
//! for i in 0..10_000u32 {
//!     let k = i.to_be_bytes();
//!     tree = tree.put(&txn, &k, &(i * i).to_le_bytes(), true).unwrap().tree_or(&tree);
//! }
//! let tree = txn.set_root(0, &tree).unwrap();
//! txn.commit().unwrap();
//!
//! let txn = Env::txn_begin(&env);
//! let tree = txn.root_tree(0).unwrap();
//! let v = tree.get(&txn, &5_000u32.to_be_bytes()).unwrap();
//! assert_eq!(v, Some((5_000u32 * 5_000).to_le_bytes().to_vec()));
//! for entry in tree.iter(&txn, None).unwrap() {
//!     let (k, v) = entry.unwrap();
//!     let k = u32::from_be_bytes([k[0], k[1], k[2], k[3]]);
//!     assert_eq!(&v[..], &(k * k).to_le_bytes()[..]);
//! }
//! ```
//!
//! Pages go through three stages:
//!
//! - While a writer builds a tree, its new pages are plain in-memory
//! values, shared between the successive versions of the tree. They
//! are not visible to any other thread, unless the writer hands a
//! tree over.
//!
//! - Flushing a tree (with [`btree::TransientBTree::flush`], or
//! [`MutTxn::set_root`]) gives an address to each of these pages, in
//! the "novelty": the in-memory overlay of pages written by the
//! current mutable transaction. Novelty addresses resolve to the
//! page objects themselves.
//!
//! - Committing the transaction encodes the novelty pages into the
//! page store, at the same offsets, and removes them from the
//! novelty. Since the novelty is consulted first and the store is the
//! fallback, a novelty address stays valid after the commit.
//!
//! Readers ([`Txn`]) see the root slots as they were when they
//! started, and are never blocked by the writer. Aborting a mutable
//! transaction (dropping it without committing) discards its novelty
//! pages.

use thiserror::*;

mod environment;
pub use environment::{Commit, Env, MutTxn, Txn};
pub use onair_btree_core::{
    btree, Address, AllocPage, ChildRef, KeyValueConsumer, LoadPage, Page, Prototype, TreeError,
};

#[cfg(test)]
mod tests;

#[doc(hidden)]
pub mod debug;

/// Errors that can occur while transacting.
#[derive(Debug, Error)]
pub enum Error {
    /// IO errors, from the `std::io` module.
    #[error(transparent)]
    IO(#[from] std::io::Error),
    /// Errors raised by the trees.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// CRC check failed
    #[error(transparent)]
    CRC(#[from] CRCError),
    /// A page could not be decoded, or an invariant of the trees does
    /// not hold.
    #[error("Corrupt page: {0}")]
    Corrupt(&'static str),
    /// No page at this address.
    #[error("Unknown address {0}")]
    UnknownAddress(Address),
    /// The root slot doesn't exist.
    #[error("Root slot {0} out of bounds")]
    RootOutOfBounds(usize),
}

/// A CRC check failed
#[derive(Debug, Error)]
#[error("CRC check failed")]
pub struct CRCError {}
