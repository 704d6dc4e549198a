use super::page::Page;
use crate::LoadPage;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// An iterator over the entries of a tree, in increasing order of
/// keys. Pages are resolved lazily, one leaf at a time.
pub struct Iter<'a, T: LoadPage> {
    txn: &'a T,
    /// The path from the root to the current leaf. For internal pages,
    /// the index is that of the child currently being visited, or of
    /// the next child to visit if the page is at the top of the
    /// stack. For the leaf, it is the next entry to return.
    stack: Vec<(Arc<Page>, usize)>,
}

impl<'a, T: LoadPage> core::fmt::Debug for Iter<'a, T> {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(fmt, "Iter {{ depth: {} }}", self.stack.len())
    }
}

impl<'a, T: LoadPage> Iter<'a, T> {
    /// Set the stack to the first entry greater than or equal to
    /// `from`.
    pub(crate) fn new(txn: &'a T, root: Arc<Page>, from: Option<&[u8]>) -> Result<Self, T::Error> {
        let mut stack = Vec::new();
        let mut page = root;
        loop {
            let (index, child) = match &*page {
                Page::Bottom(p) => {
                    let index = match from.map(|k| p.base().search(k)) {
                        Some(Ok(i)) | Some(Err(i)) => i,
                        None => 0,
                    };
                    (index, None)
                }
                Page::Internal(p) => {
                    let index = match from.map(|k| p.base().search(k)) {
                        Some(Ok(i)) => i,
                        Some(Err(i)) => i.saturating_sub(1),
                        None => 0,
                    };
                    if index < p.size() {
                        (index, Some(p.get_child(txn, index)?))
                    } else {
                        (index, None)
                    }
                }
            };
            stack.push((page, index));
            if let Some(child) = child {
                page = child
            } else {
                break;
            }
        }
        Ok(Iter { txn, stack })
    }

    /// Pop the top of the stack, and move its parent to the next
    /// child.
    fn pop(&mut self) {
        self.stack.pop();
        if let Some((_, index)) = self.stack.last_mut() {
            *index += 1
        }
    }
}

impl<'a, T: LoadPage> Iterator for Iter<'a, T> {
    type Item = Result<(Vec<u8>, Arc<[u8]>), T::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (page, index) = match self.stack.last() {
                Some((page, index)) => (page.clone(), *index),
                None => return None,
            };
            match &*page {
                Page::Bottom(p) if index < p.size() => {
                    if let Some((_, i)) = self.stack.last_mut() {
                        *i += 1
                    }
                    return Some(Ok((p.base().key(index), p.value(index).clone())));
                }
                Page::Internal(p) if index < p.size() => match p.get_child(self.txn, index) {
                    Ok(child) => self.stack.push((child, 0)),
                    Err(e) => {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                },
                _ => self.pop(),
            }
        }
    }
}
