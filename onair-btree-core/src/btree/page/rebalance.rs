use super::Page;
use crate::TreeError;

/// Result of a merge or rebalance of two adjacent siblings, without
/// touching their parent.
#[derive(Debug)]
pub(crate) enum Op {
    /// The right page fits into the left one.
    Merged(Page),
    /// The entries were spread evenly over two new pages.
    Rebalanced { left: Page, right: Page },
}

/// Merge `right` into `left` if the result fits in a page, else move
/// entries from the larger page to the smaller one until both hold
/// half of the entries. Neither input page is modified.
pub(crate) fn merge_or_rebalance(left: &Page, right: &Page, epoch: u64) -> Result<Op, TreeError> {
    let base = left.prototype().base();
    let total = left.size() + right.size();
    let mut new_left = left.transient_copy(epoch);
    if total <= base {
        new_left.merge_with(right)?;
        return Ok(Op::Merged(new_left));
    }
    let left_size = (total + 1) / 2;
    if left.size() > left_size {
        // Rotate the tail of `left` to the front of `right`.
        let n = left.size() - left_size;
        let mut new_right = new_left.split(left_size, n)?;
        new_right.merge_with(right)?;
        Ok(Op::Rebalanced {
            left: new_left,
            right: new_right,
        })
    } else {
        // Rotate the head of `right` to the end of `left`.
        let n = left_size - left.size();
        let mut head = right.transient_copy(epoch);
        let new_right = head.split(n, right.size() - n)?;
        new_left.merge_with(&head)?;
        Ok(Op::Rebalanced {
            left: new_left,
            right: new_right,
        })
    }
}
