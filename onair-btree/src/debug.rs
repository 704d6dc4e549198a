use crate::Error;
use log::*;
use onair_btree_core::btree::TransientBTree;
use onair_btree_core::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Write the pages of `trees` to a Graphviz file at `p`. Pages shared
/// between the trees are printed once.
pub fn debug<P: AsRef<Path>, T: LoadPage<Error = Error>>(
    t: &T,
    trees: &[&TransientBTree],
    p: P,
    recurse: bool,
) -> Result<(), Error> {
    let f = File::create(p.as_ref())?;
    let mut buf = BufWriter::new(f);
    writeln!(&mut buf, "digraph{{")?;
    let mut h = HashSet::new();
    for tree in trees {
        let root = tree.root(t)?;
        print_page(t, &mut h, &mut buf, &root, tree.address(), recurse)?;
    }
    writeln!(&mut buf, "}}")?;
    Ok(())
}

/// A name for a page: its offset if it has one, else where it lives
/// in memory.
fn page_id(p: &Arc<Page>, address: Option<Address>) -> String {
    match address {
        Some(a) => format!("{}", a.offset()),
        None => format!("m{:x}", Arc::as_ptr(p) as usize),
    }
}

fn print_page<T: LoadPage<Error = Error>>(
    txn: &T,
    pages: &mut HashSet<String>,
    buf: &mut dyn Write,
    p: &Arc<Page>,
    address: Option<Address>,
    print_children: bool,
) -> Result<(), Error> {
    let id = page_id(p, address);
    if !pages.insert(id.clone()) {
        return Ok(());
    }
    let label = match address {
        Some(a) => format!("{}", a),
        None => "transient".to_string(),
    };
    writeln!(
        buf,
        "subgraph cluster{} {{\nlabel=\"Page {}, epoch {}\";\ncolor=black;",
        id,
        label,
        p.epoch()
    )?;
    let mut children = Vec::new();
    let mut edges = Vec::new();
    for i in 0..p.size() {
        if i > 0 {
            writeln!(buf, "n_{}_{}->n_{}_{}[color=\"blue\"];", id, i - 1, id, i)?;
        }
        match &**p {
            Page::Bottom(b) => writeln!(
                buf,
                "n_{}_{}[label=\"{}: {:?} -> {:?}\"];",
                id,
                i,
                i,
                b.base().key(i),
                b.value(i)
            )?,
            Page::Internal(n) => {
                writeln!(buf, "n_{}_{}[label=\"{}: {:?}\"];", id, i, i, n.base().key(i))?;
                let child = n.get_child(txn, i)?;
                let child_address = n.children()[i].address();
                edges.push(format!(
                    "n_{}_{}->n_{}_0[color=\"red\"];",
                    id,
                    i,
                    page_id(&child, child_address)
                ));
                children.push((child, child_address));
            }
        }
    }
    writeln!(buf, "}}")?;
    for e in edges.iter() {
        writeln!(buf, "{}", e)?
    }
    if print_children {
        for (c, a) in children.iter() {
            print_page(txn, pages, buf, c, *a, print_children)?
        }
    }
    Ok(())
}

/// What [`check_tree`] found while walking a tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of key-value pairs.
    pub entries: usize,
    /// Number of levels, 1 for a single leaf.
    pub height: usize,
    /// Number of pages reachable from the root.
    pub pages: usize,
}

/// Walk the whole tree and check its structural invariants: keys are
/// strictly increasing, within the bounds set by the parents, and
/// each separator is the minimum key of its child; pages hold at most
/// `base` entries, and non-root pages at least `(base + 1) / 2`; all
/// leaves are at the same depth.
pub fn check_tree<T: LoadPage<Error = Error>>(
    txn: &T,
    tree: &TransientBTree,
) -> Result<TreeStats, Error> {
    let root = tree.root(txn)?;
    let mut stats = TreeStats::default();
    let mut leaf_depth = None;
    if let Page::Internal(ref r) = *root {
        if r.size() < 2 {
            error!("internal root with {:?} children", r.size());
            return Err(Error::Corrupt("internal root with fewer than two children"));
        }
    }
    check_page(txn, &root, true, None, None, 1, &mut leaf_depth, &mut stats)?;
    stats.height = leaf_depth.unwrap_or(1);
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn check_page<T: LoadPage<Error = Error>>(
    txn: &T,
    p: &Arc<Page>,
    is_root: bool,
    lower: Option<&[u8]>,
    upper: Option<&[u8]>,
    depth: usize,
    leaf_depth: &mut Option<usize>,
    stats: &mut TreeStats,
) -> Result<(), Error> {
    stats.pages += 1;
    let proto = p.prototype();
    let size = p.size();
    if size > proto.base() {
        return Err(Error::Corrupt("page larger than its base"));
    }
    if !is_root && size < proto.min_occupancy() {
        error!(
            "page at depth {:?}: {:?} entries, min {:?}",
            depth,
            size,
            proto.min_occupancy()
        );
        return Err(Error::Corrupt("page below minimum occupancy"));
    }
    for i in 0..size {
        let k = p.key(i);
        if i > 0 && p.key(i - 1) >= k {
            return Err(Error::Corrupt("keys not strictly increasing"));
        }
        if lower.map(|l| k.as_slice() < l).unwrap_or(false)
            || upper.map(|u| k.as_slice() >= u).unwrap_or(false)
        {
            error!("key {:?} out of bounds {:?} {:?}", k, lower, upper);
            return Err(Error::Corrupt("key outside of its parent's bounds"));
        }
    }
    match **p {
        Page::Bottom(_) => {
            stats.entries += size;
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(d) if d != depth => return Err(Error::Corrupt("leaves at different depths")),
                _ => {}
            }
        }
        Page::Internal(ref n) => {
            for i in 0..size {
                let child = n.get_child(txn, i)?;
                let sep = n.base().key(i);
                if child.size() == 0 || child.min_key()? != sep {
                    error!("separator {:?} at {:?}", sep, i);
                    return Err(Error::Corrupt("separator is not the minimum key of its child"));
                }
                let next = if i + 1 < size {
                    Some(n.base().key(i + 1))
                } else {
                    None
                };
                let upper = next.as_deref().or(upper);
                check_page(
                    txn,
                    &child,
                    false,
                    Some(sep.as_slice()),
                    upper,
                    depth + 1,
                    leaf_depth,
                    stats,
                )?;
            }
        }
    }
    Ok(())
}
